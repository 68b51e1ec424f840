// Event detectors run over a host's latest scan: lifecycle, sustained threshold, anomaly.

use super::baseline::BaselineCollector;
use super::threshold::{ThresholdKind, ThresholdTrackers};
use crate::models::{
    ContainerBaselineStats, ContainerSnapshot, EventType, LifecycleEvent, LifecycleKind,
    NotificationEvent,
};
use crate::store::Store;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

/// Maps a derived transition to the event type it is reported as. Other kinds are not reported.
fn lifecycle_event_type(kind: LifecycleKind) -> Option<EventType> {
    match kind {
        LifecycleKind::Started => Some(EventType::ContainerStarted),
        LifecycleKind::Stopped => Some(EventType::ContainerStopped),
        LifecycleKind::Paused => Some(EventType::ContainerPaused),
        LifecycleKind::Resumed => Some(EventType::ContainerResumed),
        LifecycleKind::ImageUpdated => Some(EventType::NewImage),
        LifecycleKind::StateChange => Some(EventType::StateChange),
        _ => None,
    }
}

fn lifecycle_to_event(
    container: &ContainerSnapshot,
    transition: &LifecycleEvent,
) -> Option<NotificationEvent> {
    let event_type = lifecycle_event_type(transition.kind)?;
    let mut event = NotificationEvent::for_container(event_type, container);
    event.timestamp = transition.timestamp;
    event.old_state = transition.old_state.clone();
    event.new_state = transition.new_state.clone();
    event.old_image = transition.old_image.clone();
    event.new_image = transition.new_image.clone();
    Some(event)
}

/// Reports each container's latest transition if it happened within `window`.
/// On an image update, the pre-update baseline is captured before the event is returned.
pub async fn detect_lifecycle_events(
    store: &dyn Store,
    baseline: &BaselineCollector,
    host_id: i64,
    now: DateTime<Utc>,
    window: Duration,
) -> anyhow::Result<Vec<NotificationEvent>> {
    let containers = store.get_containers_by_host(host_id).await?;
    let mut events = Vec::new();

    for c in &containers {
        let transitions = match store.get_container_lifecycle_events(&c.name, host_id).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, container = %c.name, host_id, "lifecycle lookup failed");
                continue;
            }
        };
        let Some(last) = transitions.last() else {
            continue;
        };
        if now - last.timestamp >= window {
            continue;
        }
        let Some(event) = lifecycle_to_event(c, last) else {
            continue;
        };

        if last.kind == LifecycleKind::ImageUpdated
            && let Some(old_image_id) = last.old_image_id.as_deref()
            && let Err(e) = baseline
                .update_baseline_on_image_change(
                    &c.id,
                    host_id,
                    &c.name,
                    old_image_id,
                    last.timestamp,
                )
                .await
        {
            tracing::warn!(error = %e, container = %c.name, host_id, "pre-update baseline capture failed");
        }

        events.push(event);
    }
    Ok(events)
}

/// Feeds every running container's CPU and memory readings into the trackers.
/// A positive reading counts as a breach; rules apply their own magnitude later.
pub async fn detect_threshold_events(
    store: &dyn Store,
    trackers: &ThresholdTrackers,
    host_id: i64,
    now: DateTime<Utc>,
    min_duration: Duration,
) -> anyhow::Result<Vec<NotificationEvent>> {
    let containers = store.get_containers_by_host(host_id).await?;
    let mut events = Vec::new();

    for c in &containers {
        if !c.is_running() {
            trackers.clear(&c.id, host_id, ThresholdKind::Cpu);
            trackers.clear(&c.id, host_id, ThresholdKind::Memory);
            continue;
        }
        for (kind, value) in [
            (ThresholdKind::Cpu, c.cpu_percent),
            (ThresholdKind::Memory, c.memory_percent),
        ] {
            if value <= 0.0 {
                trackers.clear(&c.id, host_id, kind);
                continue;
            }
            if !trackers.check(&c.id, host_id, kind, now, min_duration) {
                continue;
            }
            let mut event = NotificationEvent::for_container(kind.event_type(), c);
            event.timestamp = now;
            match kind {
                ThresholdKind::Cpu => event.cpu_percent = Some(value),
                ThresholdKind::Memory => event.memory_percent = Some(value),
            }
            events.push(event);
        }
    }
    Ok(events)
}

/// Relative increase of `current` over `baseline`, or None when the baseline is not positive.
fn relative_increase(current: f64, baseline: f64) -> Option<f64> {
    (baseline > 0.0).then(|| (current - baseline) / baseline)
}

/// Builds an anomaly event if CPU or memory rose by more than `threshold` over the baseline.
fn anomaly_event(
    container: &ContainerSnapshot,
    baseline: &ContainerBaselineStats,
    threshold: f64,
) -> Option<NotificationEvent> {
    let cpu_increase = relative_increase(container.cpu_percent, baseline.avg_cpu_percent);
    let mem_increase = relative_increase(container.memory_percent, baseline.avg_memory_percent);

    let exceeds = |r: Option<f64>| r.is_some_and(|r| r > threshold);
    if !exceeds(cpu_increase) && !exceeds(mem_increase) {
        return None;
    }

    let mut event = NotificationEvent::for_container(EventType::AnomalousBehavior, container);
    event.cpu_percent = Some(container.cpu_percent);
    event.memory_percent = Some(container.memory_percent);
    event.metadata.insert("baseline_cpu".into(), json!(baseline.avg_cpu_percent));
    event.metadata.insert("baseline_memory".into(), json!(baseline.avg_memory_percent));
    event.metadata.insert("baseline_image_id".into(), json!(baseline.image_id));
    if let Some(r) = cpu_increase {
        event.metadata.insert("cpu_increase_pct".into(), json!(r * 100.0));
    }
    if let Some(r) = mem_increase {
        event.metadata.insert("mem_increase_pct".into(), json!(r * 100.0));
    }
    Some(event)
}

/// Compares every running container with a memory limit against its stored baseline.
pub async fn detect_anomalies(
    store: &dyn Store,
    host_id: i64,
    threshold: f64,
) -> anyhow::Result<Vec<NotificationEvent>> {
    let containers = store.get_containers_by_host(host_id).await?;
    let mut events = Vec::new();

    for c in containers.iter().filter(|c| c.is_running() && c.memory_limit > 0) {
        let baseline = match store.get_container_baseline(&c.id, host_id).await {
            Ok(Some(b)) => b,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, container = %c.name, host_id, "baseline lookup failed");
                continue;
            }
        };
        if let Some(event) = anomaly_event(c, &baseline, threshold) {
            events.push(event);
        }
    }
    Ok(events)
}

// Rolling per-container resource baselines, the reference for anomaly detection.

use crate::config::BaselineConfig;
use crate::models::{ContainerBaselineStats, StatsPoint};
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::instrument;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaselineUpdateSummary {
    pub updated: usize,
    pub failed: usize,
}

pub struct BaselineCollector {
    store: Arc<dyn Store>,
    window_hours: u32,
    min_samples: u32,
}

impl BaselineCollector {
    pub fn new(store: Arc<dyn Store>, config: &BaselineConfig) -> Self {
        Self {
            store,
            window_hours: config.window_hours,
            min_samples: config.min_samples,
        }
    }

    /// Recomputes baselines for every container on every enabled, stats-collecting host.
    /// Per-host and per-container failures are counted, logged and skipped.
    #[instrument(skip(self), fields(operation = "update_baselines"))]
    pub async fn update_baselines(&self) -> anyhow::Result<BaselineUpdateSummary> {
        let hosts = self.store.get_hosts().await?;
        let mut summary = BaselineUpdateSummary::default();

        for host in hosts.iter().filter(|h| h.enabled && h.collect_stats) {
            match self.update_host_baselines(host.id).await {
                Ok(host_summary) => {
                    summary.updated += host_summary.updated;
                    summary.failed += host_summary.failed;
                }
                Err(e) => {
                    tracing::warn!(error = %e, host = %host.name, "baseline update failed for host");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            updated = summary.updated,
            failed = summary.failed,
            "baseline update complete"
        );
        Ok(summary)
    }

    async fn update_host_baselines(&self, host_id: i64) -> anyhow::Result<BaselineUpdateSummary> {
        let containers = self.store.get_containers_by_host(host_id).await?;
        let mut summary = BaselineUpdateSummary::default();

        for c in &containers {
            let baseline = match self
                .calculate_baseline(&c.id, host_id, &c.name, &c.image_id)
                .await
            {
                Ok(Some(b)) => b,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, container = %c.name, host_id, "baseline calculation failed");
                    summary.failed += 1;
                    continue;
                }
            };
            if let Err(e) = self.store.save_container_baseline(&baseline).await {
                tracing::warn!(error = %e, container = %c.name, host_id, "baseline save failed");
                summary.failed += 1;
                continue;
            }
            summary.updated += 1;
        }
        Ok(summary)
    }

    /// Averages the trailing window. `Ok(None)` when there are too few non-idle samples.
    pub async fn calculate_baseline(
        &self,
        container_id: &str,
        host_id: i64,
        container_name: &str,
        image_id: &str,
    ) -> anyhow::Result<Option<ContainerBaselineStats>> {
        self.calculate_baseline_before(container_id, host_id, container_name, image_id, None)
            .await
    }

    /// Like `calculate_baseline`, restricted to samples taken strictly before `cutoff`.
    async fn calculate_baseline_before(
        &self,
        container_id: &str,
        host_id: i64,
        container_name: &str,
        image_id: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Option<ContainerBaselineStats>> {
        let mut points = self
            .store
            .get_container_stats(container_id, host_id, self.window_hours)
            .await?;
        if let Some(cutoff) = cutoff {
            points.retain(|p| p.timestamp < cutoff);
        }
        Ok(average_samples(&points, self.min_samples).map(|avg| ContainerBaselineStats {
            container_id: container_id.to_string(),
            container_name: container_name.to_string(),
            host_id,
            image_id: image_id.to_string(),
            avg_cpu_percent: avg.cpu_percent,
            avg_memory_percent: avg.memory_percent,
            avg_memory_usage: avg.memory_usage,
            sample_count: avg.samples,
            window_start: avg.first,
            window_end: avg.last,
        }))
    }

    /// Freezes the baseline under the outgoing image from samples taken before `updated_at`.
    /// Returns false when a baseline for the old image already exists or there was not
    /// enough history to compute one.
    #[instrument(skip(self), fields(operation = "update_baseline_on_image_change"))]
    pub async fn update_baseline_on_image_change(
        &self,
        container_id: &str,
        host_id: i64,
        container_name: &str,
        old_image_id: &str,
        updated_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        if let Some(existing) = self.store.get_container_baseline(container_id, host_id).await?
            && existing.image_id == old_image_id
        {
            return Ok(false);
        }
        let Some(baseline) = self
            .calculate_baseline_before(
                container_id,
                host_id,
                container_name,
                old_image_id,
                Some(updated_at),
            )
            .await?
        else {
            tracing::debug!(container = %container_name, "not enough history for pre-update baseline");
            return Ok(false);
        };
        self.store.save_container_baseline(&baseline).await?;
        tracing::info!(
            container = %container_name,
            samples = baseline.sample_count,
            "captured baseline before image update"
        );
        Ok(true)
    }

    /// Runs `update_baselines` now and then every `interval` until shutdown.
    pub fn spawn_periodic_updates(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Err(e) = self.update_baselines().await {
                            tracing::warn!(error = %e, operation = "update_baselines", "periodic baseline update failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::debug!("Baseline collector shutting down");
                        break;
                    }
                }
            }
        })
    }
}

struct Averages {
    cpu_percent: f64,
    memory_percent: f64,
    memory_usage: u64,
    samples: u32,
    first: DateTime<Utc>,
    last: DateTime<Utc>,
}

/// Mean over samples with CPU or memory activity. Idle placeholder samples are ignored.
fn average_samples(points: &[StatsPoint], min_samples: u32) -> Option<Averages> {
    let active: Vec<&StatsPoint> = points
        .iter()
        .filter(|p| p.cpu_percent > 0.0 || p.memory_usage > 0)
        .collect();
    let n = active.len();
    if n == 0 || n < min_samples as usize {
        return None;
    }
    let cpu: f64 = active.iter().map(|p| p.cpu_percent).sum();
    let mem_pct: f64 = active.iter().map(|p| p.memory_percent).sum();
    let mem_bytes: u128 = active.iter().map(|p| p.memory_usage as u128).sum();
    Some(Averages {
        cpu_percent: cpu / n as f64,
        memory_percent: mem_pct / n as f64,
        memory_usage: (mem_bytes / n as u128) as u64,
        samples: n as u32,
        first: active[0].timestamp,
        last: active[n - 1].timestamp,
    })
}

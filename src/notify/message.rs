// Human-readable notification text. Used for delivery and for the log row.

use crate::models::{EventType, NotificationEvent};
use std::collections::BTreeMap;

fn or_unknown(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or("unknown")
}

pub fn build_message(event: &NotificationEvent) -> String {
    let name = &event.container_name;
    let host = &event.host_name;
    match event.event_type {
        EventType::NewImage => format!(
            "🔄 Image updated for {} on {}: {} → {}",
            name,
            host,
            or_unknown(&event.old_image),
            or_unknown(&event.new_image)
        ),
        EventType::ContainerStarted => format!("✅ Container started: {} on {}", name, host),
        EventType::ContainerStopped => format!("🛑 Container stopped: {} on {}", name, host),
        EventType::ContainerPaused => format!("⏸️ Container paused: {} on {}", name, host),
        EventType::ContainerResumed => format!("▶️ Container resumed: {} on {}", name, host),
        EventType::HighCpu => format!(
            "⚠️ High CPU usage: {} on {} ({:.1}%)",
            name,
            host,
            event.cpu_percent.unwrap_or_default()
        ),
        EventType::HighMemory => format!(
            "⚠️ High memory usage: {} on {} ({:.1}%)",
            name,
            host,
            event.memory_percent.unwrap_or_default()
        ),
        EventType::AnomalousBehavior => format!(
            "🔍 Anomalous behavior detected: {} on {} (CPU: {:.1}%, Memory: {:.1}%)",
            name,
            host,
            event.cpu_percent.unwrap_or_default(),
            event.memory_percent.unwrap_or_default()
        ),
        EventType::StateChange => format!(
            "🔄 State changed: {} on {} ({} → {})",
            name,
            host,
            or_unknown(&event.old_state),
            or_unknown(&event.new_state)
        ),
        other => format!("Event: {} for {} on {}", other, name, host),
    }
}

/// Summary of notifications held back by the rate limiter, e.g.
/// "📦 3 notifications held back by rate limit: 2× container_stopped, 1× high_cpu".
pub fn build_batch_summary(counts: &BTreeMap<EventType, usize>) -> String {
    let total: usize = counts.values().sum();
    let breakdown = counts
        .iter()
        .map(|(event_type, n)| format!("{}× {}", n, event_type))
        .collect::<Vec<_>>()
        .join(", ");
    let noun = if total == 1 { "notification" } else { "notifications" };
    format!("📦 {} {} held back by rate limit: {}", total, noun, breakdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationEvent;

    fn event(event_type: EventType) -> NotificationEvent {
        let mut e = NotificationEvent::test_event();
        e.event_type = event_type;
        e.container_name = "web".into();
        e.host_name = "alpha".into();
        e
    }

    #[test]
    fn stopped_message() {
        assert_eq!(
            build_message(&event(EventType::ContainerStopped)),
            "🛑 Container stopped: web on alpha"
        );
    }

    #[test]
    fn high_cpu_message_has_one_decimal() {
        let mut e = event(EventType::HighCpu);
        e.cpu_percent = Some(91.26);
        assert_eq!(build_message(&e), "⚠️ High CPU usage: web on alpha (91.3%)");
    }

    #[test]
    fn image_update_message_names_both_images() {
        let mut e = event(EventType::NewImage);
        e.old_image = Some("nginx:1.24".into());
        e.new_image = Some("nginx:1.25".into());
        assert_eq!(
            build_message(&e),
            "🔄 Image updated for web on alpha: nginx:1.24 → nginx:1.25"
        );
    }

    #[test]
    fn untemplated_types_use_generic_text() {
        assert_eq!(
            build_message(&event(EventType::Test)),
            "Event: test for web on alpha"
        );
    }

    #[test]
    fn batch_summary_counts_per_type() {
        let counts = BTreeMap::from([(EventType::ContainerStopped, 2), (EventType::HighCpu, 1)]);
        assert_eq!(
            build_batch_summary(&counts),
            "📦 3 notifications held back by rate limit: 2× container_stopped, 1× high_cpu"
        );
    }
}

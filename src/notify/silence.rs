// Mute rules applied after matching.

use super::rules::{NotificationTask, glob_match};
use crate::models::{NotificationEvent, NotificationSilence};
use chrono::{DateTime, Utc};

/// Whether `silence` mutes `event` at `now`.
///
/// With a host set, the silence only applies to that host: it mutes the whole host when it
/// names no container, otherwise the named container id or the container pattern must match.
/// Without a host, only the container pattern is considered.
pub fn silence_matches(
    silence: &NotificationSilence,
    event: &NotificationEvent,
    now: DateTime<Utc>,
) -> bool {
    if !silence.is_active(now) {
        return false;
    }
    let container_id = silence.container_id.as_deref().filter(|s| !s.is_empty());
    let pattern = silence.container_pattern.as_deref().filter(|s| !s.is_empty());

    if let Some(host_id) = silence.host_id {
        if host_id != event.host_id {
            return false;
        }
        if container_id.is_none() && pattern.is_none() {
            return true;
        }
        if container_id == Some(event.container_id.as_str()) {
            return true;
        }
    }

    pattern.is_some_and(|p| glob_match(p, &event.container_name))
}

/// Drops tasks whose event is muted by any silence.
pub fn filter_silenced(
    tasks: Vec<NotificationTask>,
    silences: &[NotificationSilence],
    now: DateTime<Utc>,
) -> Vec<NotificationTask> {
    tasks
        .into_iter()
        .filter(|task| {
            let muted = silences
                .iter()
                .find(|s| silence_matches(s, &task.event, now));
            if let Some(s) = muted {
                tracing::debug!(
                    silence_id = s.id,
                    rule_id = task.rule_id,
                    container = %task.event.container_name,
                    "skipped: silenced"
                );
            }
            muted.is_none()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn silence() -> NotificationSilence {
        NotificationSilence {
            id: 1,
            host_id: None,
            container_id: None,
            container_pattern: None,
            silenced_until: Utc::now() + Duration::hours(1),
            reason: String::new(),
        }
    }

    fn event(container_id: &str, name: &str, host_id: i64) -> NotificationEvent {
        let mut e = NotificationEvent::test_event();
        e.container_id = container_id.into();
        e.container_name = name.into();
        e.host_id = host_id;
        e
    }

    #[test]
    fn exact_container_on_host() {
        let s = NotificationSilence {
            host_id: Some(1),
            container_id: Some("X".into()),
            ..silence()
        };
        let now = Utc::now();
        assert!(silence_matches(&s, &event("X", "web", 1), now));
        assert!(!silence_matches(&s, &event("Y", "api", 1), now));
        assert!(!silence_matches(&s, &event("X", "web", 2), now));
    }

    #[test]
    fn whole_host() {
        let s = NotificationSilence {
            host_id: Some(1),
            ..silence()
        };
        let now = Utc::now();
        assert!(silence_matches(&s, &event("A", "a", 1), now));
        assert!(!silence_matches(&s, &event("A", "a", 2), now));
    }

    #[test]
    fn pattern_without_host() {
        let s = NotificationSilence {
            container_pattern: Some("dev-*".into()),
            ..silence()
        };
        let now = Utc::now();
        assert!(silence_matches(&s, &event("1", "dev-web", 1), now));
        assert!(silence_matches(&s, &event("1", "dev-web", 9), now));
        assert!(!silence_matches(&s, &event("1", "prod-web", 1), now));
    }

    #[test]
    fn pattern_scoped_to_host() {
        let s = NotificationSilence {
            host_id: Some(1),
            container_pattern: Some("dev-*".into()),
            ..silence()
        };
        let now = Utc::now();
        assert!(silence_matches(&s, &event("1", "dev-web", 1), now));
        assert!(!silence_matches(&s, &event("1", "dev-web", 2), now));
        assert!(!silence_matches(&s, &event("1", "prod-web", 1), now));
    }

    #[test]
    fn expired_silence_is_inert() {
        let s = NotificationSilence {
            host_id: Some(1),
            silenced_until: Utc::now() - Duration::seconds(1),
            ..silence()
        };
        assert!(!silence_matches(&s, &event("A", "a", 1), Utc::now()));
    }

    #[test]
    fn container_id_needs_a_host() {
        let s = NotificationSilence {
            container_id: Some("X".into()),
            ..silence()
        };
        assert!(!silence_matches(&s, &event("X", "web", 1), Utc::now()));
    }
}

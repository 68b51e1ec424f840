// Lifecycle log derived from consecutive snapshots of one container.

use crate::models::{ContainerSnapshot, ContainerState, LifecycleEvent, LifecycleKind};
use chrono::Duration;

/// Gap between two scans of the same container that counts as downtime.
const DISAPPEARED_GAP_HOURS: i64 = 2;

/// Digest prefix length used in descriptions.
const SHORT_SHA_LEN: usize = 12;

/// Derives transitions from one container's snapshots, which must be ordered oldest → newest.
/// Output is ordered oldest → newest as well.
pub fn derive_lifecycle_events(snapshots: &[ContainerSnapshot]) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    let Some(first) = snapshots.first() else {
        return events;
    };

    let state_desc = match first.state {
        ContainerState::Exited => "stopped",
        other => other.as_str(),
    };
    let mut seen = LifecycleEvent::new(
        first.scanned_at,
        LifecycleKind::FirstSeen,
        format!("Container '{}' first detected ({})", first.name, state_desc),
    );
    seen.new_state = Some(first.state.as_str().to_string());
    seen.new_image = Some(first.image.clone());
    seen.new_image_id = Some(first.image_id.clone());
    events.push(seen);

    for pair in snapshots.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);

        let gap = cur.scanned_at - prev.scanned_at;
        if gap > Duration::hours(DISAPPEARED_GAP_HOURS) {
            let mut gone = LifecycleEvent::new(
                prev.scanned_at,
                LifecycleKind::Disappeared,
                format!("Container disappeared (not seen for {}m)", gap.num_minutes()),
            );
            gone.old_state = Some(prev.state.as_str().to_string());
            events.push(gone);

            let mut back = LifecycleEvent::new(
                cur.scanned_at,
                LifecycleKind::Reappeared,
                "Container reappeared in scan".to_string(),
            );
            back.new_state = Some(cur.state.as_str().to_string());
            events.push(back);
        }

        if prev.state != cur.state {
            let (kind, description) = match (prev.state, cur.state) {
                (ContainerState::Exited, ContainerState::Running) => {
                    (LifecycleKind::Started, "Container started".to_string())
                }
                (ContainerState::Running, ContainerState::Exited) => {
                    (LifecycleKind::Stopped, "Container stopped".to_string())
                }
                (ContainerState::Running, ContainerState::Paused) => {
                    (LifecycleKind::Paused, "Container paused".to_string())
                }
                (ContainerState::Paused, ContainerState::Running) => {
                    (LifecycleKind::Resumed, "Container resumed".to_string())
                }
                (old, new) => (
                    LifecycleKind::StateChange,
                    format!("State changed from '{}' to '{}'", old, new),
                ),
            };
            let mut change = LifecycleEvent::new(cur.scanned_at, kind, description);
            change.old_state = Some(prev.state.as_str().to_string());
            change.new_state = Some(cur.state.as_str().to_string());
            events.push(change);
        }

        if prev.image_id != cur.image_id {
            let mut update = LifecycleEvent::new(
                cur.scanned_at,
                LifecycleKind::ImageUpdated,
                format!(
                    "Image updated from {} to {}",
                    short_sha(&prev.image_id),
                    short_sha(&cur.image_id)
                ),
            );
            update.old_image = Some(prev.image.clone());
            update.new_image = Some(cur.image.clone());
            update.old_image_id = Some(prev.image_id.clone());
            update.new_image_id = Some(cur.image_id.clone());
            events.push(update);
        }
    }

    events
}

fn short_sha(id: &str) -> &str {
    let id = id.strip_prefix("sha256:").unwrap_or(id);
    match id.char_indices().nth(SHORT_SHA_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn snap(minute: i64, state: ContainerState, image_id: &str) -> ContainerSnapshot {
        ContainerSnapshot {
            id: "c1".into(),
            name: "web".into(),
            host_id: 1,
            host_name: "h".into(),
            image: format!("nginx:{}", image_id),
            image_id: image_id.into(),
            state,
            cpu_percent: 0.0,
            memory_usage: 0,
            memory_limit: 0,
            memory_percent: 0.0,
            restart_count: 0,
            scanned_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minute),
        }
    }

    #[test]
    fn empty_history_has_no_events() {
        assert!(derive_lifecycle_events(&[]).is_empty());
    }

    #[test]
    fn first_row_is_first_seen() {
        let events = derive_lifecycle_events(&[snap(0, ContainerState::Running, "a")]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, LifecycleKind::FirstSeen);
        assert_eq!(events[0].new_state.as_deref(), Some("running"));
    }

    #[test]
    fn running_to_exited_is_stopped() {
        let events = derive_lifecycle_events(&[
            snap(0, ContainerState::Running, "a"),
            snap(2, ContainerState::Exited, "a"),
        ]);
        let last = events.last().unwrap();
        assert_eq!(last.kind, LifecycleKind::Stopped);
        assert_eq!(last.old_state.as_deref(), Some("running"));
        assert_eq!(last.new_state.as_deref(), Some("exited"));
    }

    #[test]
    fn transition_kinds() {
        let events = derive_lifecycle_events(&[
            snap(0, ContainerState::Exited, "a"),
            snap(1, ContainerState::Running, "a"),
            snap(2, ContainerState::Paused, "a"),
            snap(3, ContainerState::Running, "a"),
            snap(4, ContainerState::Restarting, "a"),
        ]);
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LifecycleKind::FirstSeen,
                LifecycleKind::Started,
                LifecycleKind::Paused,
                LifecycleKind::Resumed,
                LifecycleKind::StateChange,
            ]
        );
    }

    #[test]
    fn image_change_carries_old_and_new_identity() {
        let events = derive_lifecycle_events(&[
            snap(0, ContainerState::Running, "sha256:aaaaaaaaaaaaaaaaaaaa"),
            snap(5, ContainerState::Running, "sha256:bbbbbbbbbbbbbbbbbbbb"),
        ]);
        let last = events.last().unwrap();
        assert_eq!(last.kind, LifecycleKind::ImageUpdated);
        assert_eq!(last.old_image_id.as_deref(), Some("sha256:aaaaaaaaaaaaaaaaaaaa"));
        assert_eq!(last.new_image.as_deref(), Some("nginx:sha256:bbbbbbbbbbbbbbbbbbbb"));
        assert_eq!(last.description, "Image updated from aaaaaaaaaaaa to bbbbbbbbbbbb");
    }

    #[test]
    fn long_gap_emits_disappeared_and_reappeared() {
        let events = derive_lifecycle_events(&[
            snap(0, ContainerState::Running, "a"),
            snap(200, ContainerState::Running, "a"),
        ]);
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LifecycleKind::FirstSeen,
                LifecycleKind::Disappeared,
                LifecycleKind::Reappeared,
            ]
        );
    }
}

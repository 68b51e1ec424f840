// Sustained-breach tracking for CPU and memory readings.

use crate::models::EventType;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdKind {
    Cpu,
    Memory,
}

impl ThresholdKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdKind::Cpu => "cpu",
            ThresholdKind::Memory => "memory",
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            ThresholdKind::Cpu => EventType::HighCpu,
            ThresholdKind::Memory => EventType::HighMemory,
        }
    }

    /// The tracker kind behind a threshold event, if any.
    pub fn from_event_type(event_type: EventType) -> Option<Self> {
        match event_type {
            EventType::HighCpu => Some(ThresholdKind::Cpu),
            EventType::HighMemory => Some(ThresholdKind::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct ThresholdTracker {
    breached_at: DateTime<Utc>,
    last_notified_at: Option<DateTime<Utc>>,
    breach_count: u32,
    /// Set once the breach has been reported; cleared only by dropping the tracker.
    notified: bool,
}

type TrackerKey = (String, i64, ThresholdKind);

/// In-memory breach trackers keyed by (container_id, host_id, kind). Lost on restart.
///
/// A tracker is created on the first breaching reading and deleted on the first
/// non-breaching one. Once a breach has lasted `min_duration` it is reported, and it is
/// not reported again until a non-breaching reading ends it.
#[derive(Default)]
pub struct ThresholdTrackers {
    trackers: Mutex<HashMap<TrackerKey, ThresholdTracker>>,
}

impl ThresholdTrackers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a breaching reading. Returns true exactly once per continuous breach,
    /// on the first reading at least `min_duration` after the breach began.
    pub fn check(
        &self,
        container_id: &str,
        host_id: i64,
        kind: ThresholdKind,
        now: DateTime<Utc>,
        min_duration: Duration,
    ) -> bool {
        let mut trackers = self.trackers.lock();
        let tracker = trackers
            .entry((container_id.to_string(), host_id, kind))
            .or_insert_with(|| ThresholdTracker {
                breached_at: now,
                last_notified_at: None,
                breach_count: 0,
                notified: false,
            });
        tracker.breach_count += 1;
        if tracker.notified || now - tracker.breached_at < min_duration {
            return false;
        }
        tracker.notified = true;
        true
    }

    /// Drops the tracker; the next breach starts a fresh duration window.
    pub fn clear(&self, container_id: &str, host_id: i64, kind: ThresholdKind) {
        self.trackers
            .lock()
            .remove(&(container_id.to_string(), host_id, kind));
    }

    /// Records a delivered breach. The breach stays reported until it ends.
    pub fn reset(&self, container_id: &str, host_id: i64, kind: ThresholdKind, now: DateTime<Utc>) {
        if let Some(tracker) = self
            .trackers
            .lock()
            .get_mut(&(container_id.to_string(), host_id, kind))
        {
            tracker.last_notified_at = Some(now);
            tracker.notified = true;
        }
    }

    pub fn last_notified_at(
        &self,
        container_id: &str,
        host_id: i64,
        kind: ThresholdKind,
    ) -> Option<DateTime<Utc>> {
        self.trackers
            .lock()
            .get(&(container_id.to_string(), host_id, kind))
            .and_then(|t| t.last_notified_at)
    }

    pub fn len(&self) -> usize {
        self.trackers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn short_breach_is_never_due() {
        let trackers = ThresholdTrackers::new();
        let window = Duration::seconds(120);
        for s in [0, 30, 60, 119] {
            assert!(!trackers.check("c1", 1, ThresholdKind::Cpu, t(s), window));
        }
    }

    #[test]
    fn sustained_breach_fires_once() {
        let trackers = ThresholdTrackers::new();
        let window = Duration::seconds(120);
        assert!(!trackers.check("c1", 1, ThresholdKind::Cpu, t(0), window));
        assert!(trackers.check("c1", 1, ThresholdKind::Cpu, t(300), window));
        for s in [600, 900, 1200, 5000] {
            assert!(!trackers.check("c1", 1, ThresholdKind::Cpu, t(s), window));
        }
    }

    #[test]
    fn breach_after_clear_fires_again() {
        let trackers = ThresholdTrackers::new();
        let window = Duration::seconds(120);
        trackers.check("c1", 1, ThresholdKind::Cpu, t(0), window);
        assert!(trackers.check("c1", 1, ThresholdKind::Cpu, t(300), window));
        trackers.clear("c1", 1, ThresholdKind::Cpu);
        assert!(!trackers.check("c1", 1, ThresholdKind::Cpu, t(600), window));
        assert!(trackers.check("c1", 1, ThresholdKind::Cpu, t(900), window));
    }

    #[test]
    fn clearing_restarts_the_window() {
        let trackers = ThresholdTrackers::new();
        let window = Duration::seconds(120);
        trackers.check("c1", 1, ThresholdKind::Memory, t(0), window);
        trackers.clear("c1", 1, ThresholdKind::Memory);
        assert!(!trackers.check("c1", 1, ThresholdKind::Memory, t(130), window));
        assert!(trackers.check("c1", 1, ThresholdKind::Memory, t(250), window));
    }

    #[test]
    fn kinds_and_hosts_are_tracked_independently() {
        let trackers = ThresholdTrackers::new();
        let window = Duration::seconds(120);
        trackers.check("c1", 1, ThresholdKind::Cpu, t(0), window);
        assert!(!trackers.check("c1", 1, ThresholdKind::Memory, t(200), window));
        assert!(!trackers.check("c1", 2, ThresholdKind::Cpu, t(200), window));
        assert_eq!(trackers.len(), 3);
    }

    #[test]
    fn reset_records_delivery_without_rearming() {
        let trackers = ThresholdTrackers::new();
        let window = Duration::seconds(120);
        trackers.check("c1", 1, ThresholdKind::Cpu, t(0), window);
        assert!(trackers.check("c1", 1, ThresholdKind::Cpu, t(130), window));
        trackers.reset("c1", 1, ThresholdKind::Cpu, t(131));
        assert_eq!(trackers.last_notified_at("c1", 1, ThresholdKind::Cpu), Some(t(131)));
        assert!(!trackers.check("c1", 1, ThresholdKind::Cpu, t(400), window));
        assert!(!trackers.check("c1", 1, ThresholdKind::Cpu, t(700), window));
    }
}

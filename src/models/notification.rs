// Notification events, rules, silences, channels and delivery log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::ContainerSnapshot;

/// Event-specific auxiliary data (e.g. baseline comparison figures). Write-once, read by the UI.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Kinds of notification event; serializes to snake_case (e.g. "high_cpu").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ContainerStarted,
    ContainerStopped,
    ContainerPaused,
    ContainerResumed,
    NewImage,
    StateChange,
    HighCpu,
    HighMemory,
    AnomalousBehavior,
    /// Digest of notifications held back by the rate limiter.
    BatchSummary,
    /// Channel test message.
    Test,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ContainerStarted => "container_started",
            EventType::ContainerStopped => "container_stopped",
            EventType::ContainerPaused => "container_paused",
            EventType::ContainerResumed => "container_resumed",
            EventType::NewImage => "new_image",
            EventType::StateChange => "state_change",
            EventType::HighCpu => "high_cpu",
            EventType::HighMemory => "high_memory",
            EventType::AnomalousBehavior => "anomalous_behavior",
            EventType::BatchSummary => "batch_summary",
            EventType::Test => "test",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "container_started" => EventType::ContainerStarted,
            "container_stopped" => EventType::ContainerStopped,
            "container_paused" => EventType::ContainerPaused,
            "container_resumed" => EventType::ContainerResumed,
            "new_image" => EventType::NewImage,
            "state_change" => EventType::StateChange,
            "high_cpu" => EventType::HighCpu,
            "high_memory" => EventType::HighMemory,
            "anomalous_behavior" => EventType::AnomalousBehavior,
            "batch_summary" => EventType::BatchSummary,
            "test" => EventType::Test,
            other => anyhow::bail!("unknown event type: {other}"),
        })
    }
}

/// A detected occurrence. Consumed by the rule matcher; only the resulting log entry is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub container_id: String,
    pub container_name: String,
    pub host_id: i64,
    pub host_name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl NotificationEvent {
    /// Event carrying the identity of `container`, timestamped now.
    pub fn for_container(event_type: EventType, container: &ContainerSnapshot) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            container_id: container.id.clone(),
            container_name: container.name.clone(),
            host_id: container.host_id,
            host_name: container.host_name.clone(),
            image: container.image.clone(),
            old_state: None,
            new_state: None,
            old_image: None,
            new_image: None,
            cpu_percent: None,
            memory_percent: None,
            metadata: Metadata::new(),
        }
    }

    /// Synthetic event used by channel tests.
    pub fn test_event() -> Self {
        Self {
            event_type: EventType::Test,
            timestamp: Utc::now(),
            container_id: String::new(),
            container_name: "test-container".into(),
            host_id: 0,
            host_name: "test-host".into(),
            image: "test-image:latest".into(),
            old_state: None,
            new_state: None,
            old_image: None,
            new_image: None,
            cpu_percent: None,
            memory_percent: None,
            metadata: Metadata::new(),
        }
    }

    /// The image reference rules match against: the new image for image updates.
    pub fn match_image(&self) -> &str {
        match (&self.event_type, &self.new_image) {
            (EventType::NewImage, Some(new_image)) if !new_image.is_empty() => new_image,
            _ => &self.image,
        }
    }
}

/// User-configured matching criteria. Read fresh every processing cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRule {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub event_types: Vec<EventType>,
    /// None = all hosts.
    #[serde(default)]
    pub host_id: Option<i64>,
    #[serde(default)]
    pub container_pattern: Option<String>,
    #[serde(default)]
    pub image_pattern: Option<String>,
    #[serde(default)]
    pub cpu_threshold: Option<f64>,
    #[serde(default)]
    pub memory_threshold: Option<f64>,
    pub threshold_duration_secs: u64,
    pub cooldown_secs: u64,
    pub channel_ids: Vec<i64>,
}

/// A time-bounded mute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSilence {
    pub id: i64,
    #[serde(default)]
    pub host_id: Option<i64>,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub container_pattern: Option<String>,
    pub silenced_until: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
}

impl NotificationSilence {
    /// Expired silences are inert.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now <= self.silenced_until
    }
}

/// Stored channel configuration; instantiated into a live channel on first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    pub id: i64,
    pub name: String,
    /// "webhook", "ntfy" or "inapp".
    pub channel_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    pub enabled: bool,
}

/// Durable record of one attempted delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLog {
    pub id: i64,
    pub rule_id: Option<i64>,
    pub channel_id: Option<i64>,
    pub event_type: EventType,
    pub container_id: String,
    pub container_name: String,
    pub host_id: Option<i64>,
    pub host_name: String,
    pub message: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub sent_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub read: bool,
}

/// Counters shown on the notification settings page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStatus {
    pub unread_count: i64,
    pub total_channels: i64,
    pub enabled_channels: i64,
    pub total_rules: i64,
    pub enabled_rules: i64,
    pub recent_failures: i64,
    pub active_silences: i64,
}

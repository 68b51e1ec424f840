// Docker host, container snapshot and lifecycle models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Docker container state; serializes to lowercase JSON (e.g. "running").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Exited,
    Paused,
    Restarting,
    Created,
    Dead,
    #[serde(other)]
    Unknown,
}

impl ContainerState {
    /// Parse from Docker API state string (e.g. "running", "exited").
    pub fn from_docker(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "running" => ContainerState::Running,
            "exited" => ContainerState::Exited,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "created" => ContainerState::Created,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Running => "running",
            ContainerState::Exited => "exited",
            ContainerState::Paused => "paused",
            ContainerState::Restarting => "restarting",
            ContainerState::Created => "created",
            ContainerState::Dead => "dead",
            ContainerState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scanned Docker host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    /// Hosts without stats collection never get baselines.
    pub collect_stats: bool,
}

/// One observation of one container at scan time. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSnapshot {
    pub id: String,
    pub name: String,
    pub host_id: i64,
    pub host_name: String,
    /// Image reference, e.g. "nginx:1.25".
    pub image: String,
    /// Image content digest.
    pub image_id: String,
    pub state: ContainerState,
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    #[serde(default)]
    pub restart_count: u32,
    pub scanned_at: DateTime<Utc>,
}

impl ContainerSnapshot {
    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }
}

/// One resource sample from a container's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsPoint {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
}

/// Raw transition kinds derived from consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    FirstSeen,
    Started,
    Stopped,
    Paused,
    Resumed,
    ImageUpdated,
    StateChange,
    Disappeared,
    Reappeared,
}

/// A transition in a container's derived lifecycle log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: LifecycleKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_state: Option<String>,
    /// Full image reference with tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_image: Option<String>,
    /// Image content digest before/after an update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_image_id: Option<String>,
    pub description: String,
}

impl LifecycleEvent {
    pub fn new(timestamp: DateTime<Utc>, kind: LifecycleKind, description: String) -> Self {
        Self {
            timestamp,
            kind,
            old_state: None,
            new_state: None,
            old_image: None,
            new_image: None,
            old_image_id: None,
            new_image_id: None,
            description,
        }
    }
}

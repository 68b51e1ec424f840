// Rolling per-container resource baseline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Average resource usage of one container over the trailing window.
/// Keyed by (container_id, host_id); `image_id` is the image the averages were taken against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerBaselineStats {
    pub container_id: String,
    pub container_name: String,
    pub host_id: i64,
    pub image_id: String,
    pub avg_cpu_percent: f64,
    pub avg_memory_percent: f64,
    pub avg_memory_usage: u64,
    pub sample_count: u32,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

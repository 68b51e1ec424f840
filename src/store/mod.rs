// Persistence seam consumed by the notification engine, plus the SQLite implementation.

mod defaults;
pub mod lifecycle;
mod sqlite;

pub use lifecycle::derive_lifecycle_events;
pub use sqlite::SqliteStore;

use crate::models::{
    ContainerBaselineStats, ContainerSnapshot, Host, LifecycleEvent, NotificationChannel,
    NotificationLog, NotificationRule, NotificationSilence, StatsPoint,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Query and write operations the notification engine and baseline collector need.
/// Implementations are expected to provide atomic single-row reads and writes.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_hosts(&self) -> anyhow::Result<Vec<Host>>;

    /// Latest snapshot of every container on the host.
    async fn get_containers_by_host(&self, host_id: i64) -> anyhow::Result<Vec<ContainerSnapshot>>;

    /// Derived transitions for one container, oldest → newest.
    async fn get_container_lifecycle_events(
        &self,
        container_name: &str,
        host_id: i64,
    ) -> anyhow::Result<Vec<LifecycleEvent>>;

    /// Resource samples from the trailing `hours`, oldest → newest. Bounded by sample count.
    async fn get_container_stats(
        &self,
        container_id: &str,
        host_id: i64,
        hours: u32,
    ) -> anyhow::Result<Vec<StatsPoint>>;

    async fn get_container_baseline(
        &self,
        container_id: &str,
        host_id: i64,
    ) -> anyhow::Result<Option<ContainerBaselineStats>>;

    /// Insert or replace the baseline for (container_id, host_id).
    async fn save_container_baseline(&self, baseline: &ContainerBaselineStats)
    -> anyhow::Result<()>;

    async fn get_notification_rules(&self, enabled_only: bool)
    -> anyhow::Result<Vec<NotificationRule>>;

    /// Silences whose `silenced_until` is still in the future.
    async fn get_active_silences(&self) -> anyhow::Result<Vec<NotificationSilence>>;

    /// Time of the last successful delivery for this rule and container.
    async fn get_last_notification_time(
        &self,
        rule_id: i64,
        container_id: &str,
        host_id: i64,
    ) -> anyhow::Result<Option<DateTime<Utc>>>;

    async fn save_notification_log(&self, entry: &NotificationLog) -> anyhow::Result<()>;

    async fn get_notification_channel(&self, id: i64)
    -> anyhow::Result<Option<NotificationChannel>>;
}

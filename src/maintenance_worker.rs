// Background housekeeping: notification-log retention, snapshot pruning, scheduled VACUUM.
// VACUUM runs on a configurable schedule (cron expression or fixed interval).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::store::SqliteStore;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

/// Config for the maintenance worker.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub cleanup_interval_secs: u64,
    pub notification_retention_days: u32,
    pub notification_keep_recent: u32,
    pub snapshot_retention_days: u32,
    /// Optional cron expression for VACUUM (e.g. "0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

impl From<&DatabaseConfig> for MaintenanceConfig {
    fn from(db: &DatabaseConfig) -> Self {
        Self {
            cleanup_interval_secs: db.cleanup_interval_secs,
            notification_retention_days: db.notification_retention_days,
            notification_keep_recent: db.notification_keep_recent,
            snapshot_retention_days: db.snapshot_retention_days,
            vacuum_schedule: db.vacuum_schedule.clone(),
            vacuum_interval_secs: db.vacuum_interval_secs,
        }
    }
}

/// Spawns the maintenance worker. Returns a join handle.
pub fn spawn(
    store: Arc<SqliteStore>,
    config: MaintenanceConfig,
    shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(store, config, shutdown_rx).await;
    })
}

#[instrument(skip(store, shutdown_rx), fields(interval_secs = config.cleanup_interval_secs))]
async fn run(store: Arc<SqliteStore>, config: MaintenanceConfig, mut shutdown_rx: watch::Receiver<bool>) {
    let mut cleanup_interval =
        tokio::time::interval(Duration::from_secs(config.cleanup_interval_secs));
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
    let scheduler = tokio::spawn(vacuum_scheduler(config.clone(), vacuum_tx));

    loop {
        tokio::select! {
            _ = cleanup_interval.tick() => {
                if let Err(e) = run_one_tick(&store, &config).await {
                    warn!(error = %e, "maintenance tick failed");
                }
            }
            Some(()) = vacuum_rx.recv() => {
                if let Err(e) = store.vacuum().await {
                    warn!(error = %e, "vacuum failed");
                } else {
                    info!("vacuum complete");
                }
            }
            _ = shutdown_rx.changed() => {
                tracing::debug!("Maintenance worker shutting down");
                break;
            }
        }
    }
    scheduler.abort();
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: MaintenanceConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            let next = schedule.after(&now).next();
            if let Some(next) = next {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let interval = Duration::from_secs(config.vacuum_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}

/// Prunes the notification log and old container snapshots once.
pub async fn run_one_tick(store: &SqliteStore, config: &MaintenanceConfig) -> anyhow::Result<()> {
    let logs_deleted = store
        .cleanup_old_notifications(
            config.notification_retention_days,
            config.notification_keep_recent,
        )
        .await?;
    let snapshots_deleted = store
        .prune_container_history(config.snapshot_retention_days)
        .await?;
    if logs_deleted > 0 || snapshots_deleted > 0 {
        info!(logs_deleted, snapshots_deleted, "old rows pruned");
    }
    Ok(())
}

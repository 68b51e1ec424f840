// Maintenance worker: one-shot retention pass and shutdown

mod common;

use census::maintenance_worker::{self, MaintenanceConfig};
use census::models::ContainerState;
use census::store::Store;
use chrono::{Duration, Utc};
use common::*;

fn config() -> MaintenanceConfig {
    MaintenanceConfig {
        cleanup_interval_secs: 3600,
        notification_retention_days: 7,
        notification_keep_recent: 1,
        snapshot_retention_days: 7,
        vacuum_schedule: None,
        vacuum_interval_secs: 7 * 24 * 3600,
    }
}

#[tokio::test]
async fn run_one_tick_prunes_logs_and_snapshots() {
    let (_dir, store) = test_store().await;
    let host = store.upsert_host("local", true).await.unwrap();
    let old = Utc::now() - Duration::days(20);
    store
        .save_containers(&[snapshot(&host, "c1", "web", ContainerState::Running, old)])
        .await
        .unwrap();
    store
        .save_containers(&[snapshot(&host, "c1", "web", ContainerState::Running, Utc::now())])
        .await
        .unwrap();
    store.save_notification_log(&log_entry(None, true, old)).await.unwrap();
    store
        .save_notification_log(&log_entry(None, true, old + Duration::minutes(1)))
        .await
        .unwrap();

    maintenance_worker::run_one_tick(&store, &config()).await.unwrap();

    assert_eq!(store.get_notification_logs(10, false).await.unwrap().len(), 1);
    let events = store.get_container_lifecycle_events("web", host.id).await.unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn worker_stops_on_shutdown_signal() {
    let (_dir, store) = test_store().await;
    let (tx, rx) = tokio::sync::watch::channel(false);
    let handle = maintenance_worker::spawn(store, config(), rx);
    tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}

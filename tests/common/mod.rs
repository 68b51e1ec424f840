// Shared test helpers
#![allow(dead_code)]

use census::models::*;
use census::store::SqliteStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Fresh, initialised store in a temp dir. Keep the TempDir alive for the test's duration.
pub async fn test_store() -> (TempDir, Arc<SqliteStore>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("census.db");
    let store = SqliteStore::connect(path.to_str().unwrap(), 4).await.unwrap();
    store.init().await.unwrap();
    (dir, Arc::new(store))
}

pub fn snapshot(
    host: &Host,
    id: &str,
    name: &str,
    state: ContainerState,
    scanned_at: DateTime<Utc>,
) -> ContainerSnapshot {
    ContainerSnapshot {
        id: id.into(),
        name: name.into(),
        host_id: host.id,
        host_name: host.name.clone(),
        image: "nginx:1.25".into(),
        image_id: "sha256:aaaaaaaaaaaaaaaaaaaa".into(),
        state,
        cpu_percent: 0.0,
        memory_usage: 0,
        memory_limit: 0,
        memory_percent: 0.0,
        restart_count: 0,
        scanned_at,
    }
}

pub fn running_with_usage(
    host: &Host,
    id: &str,
    name: &str,
    cpu: f64,
    mem: f64,
    scanned_at: DateTime<Utc>,
) -> ContainerSnapshot {
    ContainerSnapshot {
        cpu_percent: cpu,
        memory_usage: (mem * 10.0) as u64,
        memory_limit: 1000,
        memory_percent: mem,
        ..snapshot(host, id, name, ContainerState::Running, scanned_at)
    }
}

pub fn rule(name: &str, event_types: Vec<EventType>, channel_ids: Vec<i64>) -> NotificationRule {
    NotificationRule {
        id: 0,
        name: name.into(),
        enabled: true,
        event_types,
        host_id: None,
        container_pattern: None,
        image_pattern: None,
        cpu_threshold: None,
        memory_threshold: None,
        threshold_duration_secs: 120,
        cooldown_secs: 0,
        channel_ids,
    }
}

pub fn channel(name: &str, channel_type: &str, config: serde_json::Value) -> NotificationChannel {
    NotificationChannel {
        id: 0,
        name: name.into(),
        channel_type: channel_type.into(),
        config,
        enabled: true,
    }
}

pub fn log_entry(rule_id: Option<i64>, success: bool, sent_at: DateTime<Utc>) -> NotificationLog {
    NotificationLog {
        id: 0,
        rule_id,
        channel_id: None,
        event_type: EventType::ContainerStopped,
        container_id: "c1".into(),
        container_name: "web".into(),
        host_id: Some(1),
        host_name: "local".into(),
        message: "stopped".into(),
        metadata: Metadata::new(),
        sent_at,
        success,
        error: (!success).then(|| "boom".to_string()),
        read: false,
    }
}

/// Polls the log until at least `n` rows exist; deliveries land asynchronously.
pub async fn wait_for_logs(store: &SqliteStore, n: usize) -> Vec<NotificationLog> {
    for _ in 0..100 {
        let logs = store.get_notification_logs(1000, false).await.unwrap();
        if logs.len() >= n {
            return logs;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    store.get_notification_logs(1000, false).await.unwrap()
}

// HTTP endpoint tests

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use census::config::{BaselineConfig, NotificationConfig};
use census::models::*;
use census::notify::{BaselineCollector, NotificationService};
use census::routes;
use census::store::{SqliteStore, Store};
use chrono::{Duration, Utc};
use common::*;
use std::sync::Arc;
use tempfile::TempDir;

async fn test_server() -> (TempDir, Arc<SqliteStore>, TestServer) {
    let (dir, store) = test_store().await;
    let dyn_store: Arc<dyn Store> = store.clone();
    let baseline = Arc::new(BaselineCollector::new(
        dyn_store.clone(),
        &BaselineConfig::default(),
    ));
    let notifier = Arc::new(NotificationService::new(
        dyn_store,
        baseline,
        &NotificationConfig::default(),
    ));
    let server = TestServer::new(routes::app(store.clone(), notifier));
    (dir, store, server)
}

#[tokio::test]
async fn test_root_endpoint() {
    let (_dir, _store, server) = test_server().await;
    let response = server.get("/").await;
    response.assert_status_ok();
    response.assert_text("Container Census");
}

#[tokio::test]
async fn test_version_endpoint() {
    let (_dir, _store, server) = test_server().await;
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(
        json.get("name").and_then(|v| v.as_str()),
        Some("container-census")
    );
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_rate_limit_stats() {
    let (_dir, _store, server) = test_server().await;
    let response = server.get("/api/notifications/rate-limit").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["capacity"], 100);
    assert_eq!(json["queued"], 0);
    assert_eq!(json["batchIntervalSecs"], 600);
    assert!(json["currentTokens"].as_f64().unwrap() <= 100.0);
}

#[tokio::test]
async fn test_status_reflects_store() {
    let (_dir, store, server) = test_server().await;
    store.initialize_default_notifications().await.unwrap();
    store
        .save_notification_log(&log_entry(None, false, Utc::now()))
        .await
        .unwrap();

    let response = server.get("/api/notifications/status").await;
    response.assert_status_ok();
    let status: NotificationStatus = response.json();
    assert_eq!(status.total_channels, 1);
    assert_eq!(status.enabled_rules, 3);
    assert_eq!(status.unread_count, 1);
    assert_eq!(status.recent_failures, 1);
}

#[tokio::test]
async fn test_logs_listing_and_read_flow() {
    let (_dir, store, server) = test_server().await;
    let now = Utc::now();
    for i in 0..3 {
        store
            .save_notification_log(&log_entry(None, true, now - Duration::minutes(i)))
            .await
            .unwrap();
    }

    let logs: Vec<NotificationLog> = server
        .get("/api/notifications/logs")
        .add_query_param("limit", 2)
        .await
        .json();
    assert_eq!(logs.len(), 2);
    assert!(logs[0].sent_at >= logs[1].sent_at);

    server
        .post(&format!("/api/notifications/logs/{}/read", logs[0].id))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let unread: Vec<NotificationLog> = server
        .get("/api/notifications/logs")
        .add_query_param("unread", true)
        .await
        .json();
    assert_eq!(unread.len(), 2);

    server
        .post("/api/notifications/logs/9999/read")
        .await
        .assert_status_not_found();

    let response = server.post("/api/notifications/logs/read-all").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["updated"], 2);
    assert_eq!(store.get_unread_notification_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_channel_test_endpoint() {
    let (_dir, store, server) = test_server().await;
    let inapp = store
        .save_notification_channel(&channel("in-app", "inapp", serde_json::json!({})))
        .await
        .unwrap();
    // Nothing listens on port 9; delivery fails after retries.
    let broken = store
        .save_notification_channel(&channel(
            "hook",
            "webhook",
            serde_json::json!({ "url": "http://127.0.0.1:9/hook" }),
        ))
        .await
        .unwrap();

    let response = server
        .post(&format!("/api/notifications/channels/{inapp}/test"))
        .await;
    response.assert_status_ok();
    assert_eq!(store.get_notification_logs(10, false).await.unwrap().len(), 1);

    server
        .post("/api/notifications/channels/424242/test")
        .await
        .assert_status_not_found();

    let response = server
        .post(&format!("/api/notifications/channels/{broken}/test"))
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    let json: serde_json::Value = response.json();
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_refresh_channels() {
    let (_dir, _store, server) = test_server().await;
    server
        .post("/api/notifications/channels/refresh")
        .await
        .assert_status(StatusCode::NO_CONTENT);
}

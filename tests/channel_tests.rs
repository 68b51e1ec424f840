// Channel delivery tests against a mock HTTP server

mod common;

use census::models::NotificationEvent;
use census::notify::NotifyError;
use census::notify::channels::{Channel, TEST_MESSAGE, create_channel};
use census::store::Store;
use common::*;
use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;

async fn dyn_store() -> (tempfile::TempDir, Arc<dyn Store>) {
    let (dir, store) = test_store().await;
    let store: Arc<dyn Store> = store;
    (dir, store)
}

#[tokio::test]
async fn webhook_posts_payload_with_custom_headers() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/hook")
        .match_header("x-api-key", "secret")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "message": "hello",
            "event_type": "test",
            "container_name": "test-container",
            "host_name": "test-host",
        })))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let (_dir, store) = dyn_store().await;
    let record = channel(
        "hook",
        "webhook",
        json!({ "url": format!("{}/hook", server.url()), "headers": { "X-Api-Key": "secret" } }),
    );
    let ch = create_channel(&record, store).unwrap();
    assert_eq!(ch.channel_type(), "webhook");
    ch.send("hello", &NotificationEvent::test_event()).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn webhook_retries_then_reports_status() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/hook")
        .with_status(500)
        .expect(3)
        .create_async()
        .await;

    let (_dir, store) = dyn_store().await;
    let record = channel("hook", "webhook", json!({ "url": format!("{}/hook", server.url()) }));
    let ch = create_channel(&record, store).unwrap();
    let err = ch.send("hello", &NotificationEvent::test_event()).await.unwrap_err();
    assert!(matches!(
        err,
        NotifyError::Status {
            status: 500,
            attempts: 3
        }
    ));
    mock.assert_async().await;
}

#[tokio::test]
async fn webhook_without_url_is_invalid() {
    let (_dir, store) = dyn_store().await;
    let record = channel("hook", "webhook", json!({}));
    assert!(matches!(
        create_channel(&record, store),
        Err(NotifyError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn ntfy_publishes_json_with_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_header("authorization", "Bearer tk_123")
        .match_body(Matcher::PartialJson(json!({
            "topic": "census",
            "message": TEST_MESSAGE,
            "title": "Container Census",
            "priority": 3,
            "tags": ["information_source"],
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let (_dir, store) = dyn_store().await;
    let record = channel(
        "push",
        "ntfy",
        json!({ "server_url": format!("{}/", server.url()), "topic": "census", "token": "tk_123" }),
    );
    let ch = create_channel(&record, store).unwrap();
    ch.test().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn ntfy_requires_topic() {
    let (_dir, store) = dyn_store().await;
    let record = channel("push", "ntfy", json!({ "server_url": "http://localhost" }));
    assert!(matches!(
        create_channel(&record, store),
        Err(NotifyError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn unknown_channel_type_is_rejected() {
    let (_dir, store) = dyn_store().await;
    let record = channel("mail", "email", json!({}));
    match create_channel(&record, store) {
        Err(NotifyError::UnknownChannelType(t)) => assert_eq!(t, "email"),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("expected an error"),
    }
}

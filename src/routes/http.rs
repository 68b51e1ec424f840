// Handlers: version, rate-limit stats, notification log and status, channel refresh/test

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::notify::NotifyError;
use crate::version::{NAME, VERSION};

const DEFAULT_LOG_LIMIT: u32 = 100;
const MAX_LOG_LIMIT: u32 = 1000;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn storage_error(e: anyhow::Error, operation: &'static str) -> Response {
    tracing::error!(error = %e, operation, "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage error")
}

/// GET /version: service name and version from Cargo.toml at build time.
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/notifications/rate-limit
pub(super) async fn rate_limit_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.notifier.rate_limiter().stats())
}

/// GET /api/notifications/status
pub(super) async fn status_handler(State(state): State<AppState>) -> Response {
    match state.store.get_notification_status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => storage_error(e, "get_notification_status"),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct LogsQuery {
    limit: Option<u32>,
    #[serde(default)]
    unread: bool,
}

/// GET /api/notifications/logs?limit=N&unread=true, newest first.
pub(super) async fn logs_handler(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    match state.store.get_notification_logs(limit, query.unread).await {
        Ok(logs) => Json(logs).into_response(),
        Err(e) => storage_error(e, "get_notification_logs"),
    }
}

/// POST /api/notifications/logs/{id}/read
pub(super) async fn mark_read_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Response {
    match state.store.mark_notification_read(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, format!("notification {id} not found")),
        Err(e) => storage_error(e, "mark_notification_read"),
    }
}

/// POST /api/notifications/logs/read-all
pub(super) async fn mark_all_read_handler(State(state): State<AppState>) -> Response {
    match state.store.mark_all_notifications_read().await {
        Ok(updated) => Json(json!({ "updated": updated })).into_response(),
        Err(e) => storage_error(e, "mark_all_notifications_read"),
    }
}

/// POST /api/notifications/channels/refresh. Call after editing channels.
pub(super) async fn refresh_channels_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.notifier.refresh_channels().await;
    StatusCode::NO_CONTENT
}

/// POST /api/notifications/channels/{id}/test
pub(super) async fn test_channel_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Response {
    match state.notifier.send_test_notification(id).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(NotifyError::ChannelNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, format!("channel {id} not found"))
        }
        Err(NotifyError::Storage(e)) => {
            tracing::error!(error = %e, channel_id = id, "test notification lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage error")
        }
        Err(e) => {
            tracing::warn!(error = %e, channel_id = id, "test notification failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

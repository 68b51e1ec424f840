// HTTP routes over the notification engine

mod http;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::notify::NotificationService;
use crate::store::SqliteStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<SqliteStore>,
    pub(crate) notifier: Arc<NotificationService>,
}

pub fn app(store: Arc<SqliteStore>, notifier: Arc<NotificationService>) -> Router {
    let state = AppState { store, notifier };
    Router::new()
        .route("/", get(|| async { "Container Census" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route(
            "/api/notifications/rate-limit",
            get(http::rate_limit_handler),
        )
        .route("/api/notifications/status", get(http::status_handler))
        .route("/api/notifications/logs", get(http::logs_handler))
        .route(
            "/api/notifications/logs/read-all",
            post(http::mark_all_read_handler),
        )
        .route(
            "/api/notifications/logs/{id}/read",
            post(http::mark_read_handler),
        )
        .route(
            "/api/notifications/channels/refresh",
            post(http::refresh_channels_handler),
        )
        .route(
            "/api/notifications/channels/{id}/test",
            post(http::test_channel_handler),
        )
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

// Delivery channels: webhook, ntfy and in-app.

mod inapp;
mod ntfy;
mod webhook;

pub use inapp::InAppChannel;
pub use ntfy::NtfyChannel;
pub use webhook::WebhookChannel;

use super::NotifyError;
use crate::models::{NotificationChannel, NotificationEvent};
use crate::store::Store;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_MESSAGE: &str = "🧪 Test notification from Container Census";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const SEND_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

#[async_trait]
pub trait Channel: Send + Sync {
    /// Deliver one rendered message. Implementations may retry transient failures internally.
    async fn send(&self, message: &str, event: &NotificationEvent) -> Result<(), NotifyError>;

    /// Deliver a fixed test message.
    async fn test(&self) -> Result<(), NotifyError>;

    fn channel_type(&self) -> &'static str;

    fn name(&self) -> &str;
}

/// Builds a live channel from its stored configuration.
pub fn create_channel(
    record: &NotificationChannel,
    store: Arc<dyn Store>,
) -> Result<Arc<dyn Channel>, NotifyError> {
    let channel: Arc<dyn Channel> = match record.channel_type.as_str() {
        "webhook" => Arc::new(WebhookChannel::from_record(record)?),
        "ntfy" => Arc::new(NtfyChannel::from_record(record)?),
        "inapp" => Arc::new(InAppChannel::new(&record.name, store)),
        other => return Err(NotifyError::UnknownChannelType(other.to_string())),
    };
    Ok(channel)
}

/// Parses a channel's JSON config; a missing config is treated as an empty object.
fn parse_config<T: serde::de::DeserializeOwned>(
    record: &NotificationChannel,
) -> Result<T, NotifyError> {
    let config = if record.config.is_null() {
        serde_json::json!({})
    } else {
        record.config.clone()
    };
    serde_json::from_value(config)
        .map_err(|e| NotifyError::InvalidConfig(format!("{}: {}", record.name, e)))
}

fn http_client() -> Result<reqwest::Client, NotifyError> {
    Ok(reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(crate::version::user_agent())
        .build()?)
}

/// Sends the request built by `build` up to `SEND_ATTEMPTS` times with exponential backoff.
/// Any 2xx response counts as delivered.
async fn send_with_retry<F>(build: F) -> Result<(), NotifyError>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let mut attempt = 1;
    loop {
        let err = match build().send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => NotifyError::Status {
                status: resp.status().as_u16(),
                attempts: attempt,
            },
            Err(e) => NotifyError::Http(e),
        };
        if attempt >= SEND_ATTEMPTS {
            return Err(err);
        }
        tracing::debug!(error = %err, attempt, "delivery attempt failed, retrying");
        tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
        attempt += 1;
    }
}

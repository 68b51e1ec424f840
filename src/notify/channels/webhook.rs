// Generic JSON webhook.

use super::{Channel, TEST_MESSAGE, http_client, parse_config, send_with_retry};
use crate::models::{EventType, Metadata, NotificationChannel, NotificationEvent};
use crate::notify::NotifyError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct WebhookConfig {
    #[serde(default)]
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    message: &'a str,
    event_type: EventType,
    timestamp: String,
    container_id: &'a str,
    container_name: &'a str,
    host_id: i64,
    host_name: &'a str,
    image: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    old_state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    old_image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpu_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory_percent: Option<f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: &'a Metadata,
}

impl<'a> WebhookPayload<'a> {
    fn new(message: &'a str, event: &'a NotificationEvent) -> Self {
        Self {
            message,
            event_type: event.event_type,
            timestamp: event.timestamp.to_rfc3339(),
            container_id: &event.container_id,
            container_name: &event.container_name,
            host_id: event.host_id,
            host_name: &event.host_name,
            image: &event.image,
            old_state: event.old_state.as_deref(),
            new_state: event.new_state.as_deref(),
            old_image: event.old_image.as_deref(),
            new_image: event.new_image.as_deref(),
            cpu_percent: event.cpu_percent,
            memory_percent: event.memory_percent,
            metadata: &event.metadata,
        }
    }
}

pub struct WebhookChannel {
    name: String,
    url: String,
    headers: BTreeMap<String, String>,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn from_record(record: &NotificationChannel) -> Result<Self, NotifyError> {
        let config: WebhookConfig = parse_config(record)?;
        if config.url.is_empty() {
            return Err(NotifyError::InvalidConfig(format!(
                "{}: webhook url is required",
                record.name
            )));
        }
        Ok(Self {
            name: record.name.clone(),
            url: config.url,
            headers: config.headers,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    async fn send(&self, message: &str, event: &NotificationEvent) -> Result<(), NotifyError> {
        let payload = WebhookPayload::new(message, event);
        send_with_retry(|| {
            let mut req = self.client.post(&self.url).json(&payload);
            for (key, value) in &self.headers {
                req = req.header(key.as_str(), value.as_str());
            }
            req
        })
        .await
    }

    async fn test(&self) -> Result<(), NotifyError> {
        self.send(TEST_MESSAGE, &NotificationEvent::test_event()).await
    }

    fn channel_type(&self) -> &'static str {
        "webhook"
    }

    fn name(&self) -> &str {
        &self.name
    }
}

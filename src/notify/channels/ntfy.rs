// ntfy publish via the JSON endpoint.

use super::{Channel, TEST_MESSAGE, http_client, parse_config, send_with_retry};
use crate::models::{EventType, NotificationChannel, NotificationEvent};
use crate::notify::NotifyError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_SERVER: &str = "https://ntfy.sh";
const TITLE: &str = "Container Census";

#[derive(Debug, Deserialize)]
struct NtfyConfig {
    #[serde(default)]
    server_url: String,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Serialize)]
struct NtfyMessage<'a> {
    topic: &'a str,
    message: &'a str,
    title: &'a str,
    priority: u8,
    tags: [&'static str; 1],
}

pub struct NtfyChannel {
    name: String,
    server_url: String,
    topic: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl NtfyChannel {
    pub fn from_record(record: &NotificationChannel) -> Result<Self, NotifyError> {
        let config: NtfyConfig = parse_config(record)?;
        if config.topic.is_empty() {
            return Err(NotifyError::InvalidConfig(format!(
                "{}: ntfy topic is required",
                record.name
            )));
        }
        let server_url = if config.server_url.is_empty() {
            DEFAULT_SERVER.to_string()
        } else {
            config.server_url.trim_end_matches('/').to_string()
        };
        Ok(Self {
            name: record.name.clone(),
            server_url,
            topic: config.topic,
            token: config.token.filter(|t| !t.is_empty()),
            client: http_client()?,
        })
    }
}

fn priority(event_type: EventType) -> u8 {
    match event_type {
        EventType::ContainerStopped
        | EventType::HighCpu
        | EventType::HighMemory
        | EventType::AnomalousBehavior => 4,
        _ => 3,
    }
}

fn tag(event_type: EventType) -> &'static str {
    match event_type {
        EventType::ContainerStarted => "white_check_mark",
        EventType::ContainerStopped => "octagonal_sign",
        EventType::NewImage => "arrows_counterclockwise",
        EventType::HighCpu | EventType::HighMemory => "warning",
        EventType::AnomalousBehavior => "mag",
        _ => "information_source",
    }
}

#[async_trait]
impl Channel for NtfyChannel {
    async fn send(&self, message: &str, event: &NotificationEvent) -> Result<(), NotifyError> {
        let body = NtfyMessage {
            topic: &self.topic,
            message,
            title: TITLE,
            priority: priority(event.event_type),
            tags: [tag(event.event_type)],
        };
        send_with_retry(|| {
            let req = self.client.post(&self.server_url).json(&body);
            match &self.token {
                Some(token) => req.bearer_auth(token),
                None => req,
            }
        })
        .await
    }

    async fn test(&self) -> Result<(), NotifyError> {
        self.send(TEST_MESSAGE, &NotificationEvent::test_event()).await
    }

    fn channel_type(&self) -> &'static str {
        "ntfy"
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgent_events_get_high_priority() {
        assert_eq!(priority(EventType::ContainerStopped), 4);
        assert_eq!(priority(EventType::AnomalousBehavior), 4);
        assert_eq!(priority(EventType::ContainerStarted), 3);
        assert_eq!(priority(EventType::Test), 3);
    }

    #[test]
    fn server_url_defaults_and_trims() {
        let mut record = NotificationChannel {
            id: 1,
            name: "ntfy".into(),
            channel_type: "ntfy".into(),
            config: serde_json::json!({ "topic": "alerts" }),
            enabled: true,
        };
        assert_eq!(NtfyChannel::from_record(&record).unwrap().server_url, "https://ntfy.sh");

        record.config = serde_json::json!({ "topic": "alerts", "server_url": "https://ntfy.example.com/" });
        assert_eq!(
            NtfyChannel::from_record(&record).unwrap().server_url,
            "https://ntfy.example.com"
        );
    }

    #[test]
    fn topic_is_required() {
        let record = NotificationChannel {
            id: 1,
            name: "ntfy".into(),
            channel_type: "ntfy".into(),
            config: serde_json::json!({}),
            enabled: true,
        };
        assert!(matches!(
            NtfyChannel::from_record(&record),
            Err(NotifyError::InvalidConfig(_))
        ));
    }
}

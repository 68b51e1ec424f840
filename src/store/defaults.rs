// First-run seeding: an in-app channel and a starter rule set.

use super::SqliteStore;
use crate::models::{EventType, NotificationChannel, NotificationRule};

impl SqliteStore {
    /// Seeds defaults when no channel exists yet. Returns true if anything was created.
    pub async fn initialize_default_notifications(&self) -> anyhow::Result<bool> {
        if !self.get_notification_channels().await?.is_empty() {
            return Ok(false);
        }

        let channel_id = self
            .save_notification_channel(&NotificationChannel {
                id: 0,
                name: "In-App Notifications".into(),
                channel_type: "inapp".into(),
                config: serde_json::json!({}),
                enabled: true,
            })
            .await?;
        tracing::info!(channel_id, "created default in-app notification channel");

        let rules = [
            default_rule("Container Stopped", vec![EventType::ContainerStopped], 300, channel_id),
            default_rule("New Image Detected", vec![EventType::NewImage], 600, channel_id),
            NotificationRule {
                cpu_threshold: Some(80.0),
                memory_threshold: Some(90.0),
                ..default_rule(
                    "High Resource Usage",
                    vec![EventType::HighCpu, EventType::HighMemory],
                    600,
                    channel_id,
                )
            },
        ];
        for rule in &rules {
            match self.save_notification_rule(rule).await {
                Ok(id) => tracing::info!(rule_id = id, rule = %rule.name, "created default notification rule"),
                Err(e) => tracing::warn!(error = %e, rule = %rule.name, "failed to create default notification rule"),
            }
        }
        Ok(true)
    }
}

fn default_rule(
    name: &str,
    event_types: Vec<EventType>,
    cooldown_secs: u64,
    channel_id: i64,
) -> NotificationRule {
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
        cooldown_secs,
        channel_ids: vec![channel_id],
    }
}

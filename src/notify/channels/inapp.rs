// In-app notifications: the dispatcher's log row is the notification.

use super::{Channel, TEST_MESSAGE};
use crate::models::{EventType, Metadata, NotificationEvent, NotificationLog};
use crate::notify::NotifyError;
use crate::store::Store;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

pub struct InAppChannel {
    name: String,
    store: Arc<dyn Store>,
}

impl InAppChannel {
    pub fn new(name: &str, store: Arc<dyn Store>) -> Self {
        Self {
            name: name.to_string(),
            store,
        }
    }
}

#[async_trait]
impl Channel for InAppChannel {
    async fn send(&self, _message: &str, _event: &NotificationEvent) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn test(&self) -> Result<(), NotifyError> {
        let event = NotificationEvent::test_event();
        self.store
            .save_notification_log(&NotificationLog {
                id: 0,
                rule_id: None,
                channel_id: None,
                event_type: EventType::Test,
                container_id: String::new(),
                container_name: event.container_name,
                host_id: None,
                host_name: event.host_name,
                message: TEST_MESSAGE.to_string(),
                metadata: Metadata::new(),
                sent_at: Utc::now(),
                success: true,
                error: None,
                read: false,
            })
            .await?;
        tracing::debug!(channel = %self.name, "in-app test notification saved");
        Ok(())
    }

    fn channel_type(&self) -> &'static str {
        "inapp"
    }

    fn name(&self) -> &str {
        &self.name
    }
}

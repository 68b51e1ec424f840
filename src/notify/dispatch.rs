// Channel cache, concurrent delivery and the delivery-log writer task.

use super::NotifyError;
use super::channels::{Channel, create_channel};
use super::message::build_message;
use super::rules::NotificationTask;
use super::threshold::{ThresholdKind, ThresholdTrackers};
use crate::models::{NotificationEvent, NotificationLog};
use crate::store::Store;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore, mpsc};

/// Channel capacity for delivery outcomes waiting to be logged.
const LOG_CHANNEL_CAPACITY: usize = 256;

/// Read-through cache of live channels keyed by channel id.
pub struct ChannelRegistry {
    store: Arc<dyn Store>,
    cache: RwLock<HashMap<i64, Arc<dyn Channel>>>,
}

impl ChannelRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Cached channel, loading it on first use. Disabled channels are an error.
    pub async fn get(&self, channel_id: i64) -> Result<Arc<dyn Channel>, NotifyError> {
        if let Some(ch) = self.cache.read().await.get(&channel_id) {
            return Ok(Arc::clone(ch));
        }
        let record = self
            .store
            .get_notification_channel(channel_id)
            .await?
            .ok_or(NotifyError::ChannelNotFound(channel_id))?;
        if !record.enabled {
            return Err(NotifyError::ChannelDisabled(channel_id));
        }
        let ch = create_channel(&record, Arc::clone(&self.store))?;
        self.cache.write().await.insert(channel_id, Arc::clone(&ch));
        Ok(ch)
    }

    /// Builds the channel from storage, bypassing the cache and the enabled flag.
    pub async fn load_fresh(&self, channel_id: i64) -> Result<Arc<dyn Channel>, NotifyError> {
        let record = self
            .store
            .get_notification_channel(channel_id)
            .await?
            .ok_or(NotifyError::ChannelNotFound(channel_id))?;
        create_channel(&record, Arc::clone(&self.store))
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// One delivery attempt: what to send, where, and on whose behalf.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub rule_id: Option<i64>,
    pub channel_id: i64,
    pub event: NotificationEvent,
    pub message: String,
}

impl From<NotificationTask> for Delivery {
    fn from(task: NotificationTask) -> Self {
        let message = build_message(&task.event);
        Self {
            rule_id: Some(task.rule_id),
            channel_id: task.channel_id,
            event: task.event,
            message,
        }
    }
}

impl Delivery {
    fn into_log(self, result: Result<(), NotifyError>) -> NotificationLog {
        let (success, error) = match result {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };
        NotificationLog {
            id: 0,
            rule_id: self.rule_id,
            channel_id: Some(self.channel_id),
            event_type: self.event.event_type,
            container_id: self.event.container_id,
            container_name: self.event.container_name,
            host_id: (self.event.host_id > 0).then_some(self.event.host_id),
            host_name: self.event.host_name,
            message: self.message,
            metadata: self.event.metadata,
            sent_at: Utc::now(),
            success,
            error,
            read: false,
        }
    }
}

/// Sends each delivery on its own task, at most `max_concurrent` at a time, and hands the
/// outcome to the log writer.
pub struct Dispatcher {
    registry: Arc<ChannelRegistry>,
    permits: Arc<Semaphore>,
    log_tx: mpsc::Sender<NotificationLog>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        max_concurrent: usize,
        log_tx: mpsc::Sender<NotificationLog>,
    ) -> Self {
        Self {
            registry,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            log_tx,
        }
    }

    pub fn dispatch(&self, delivery: Delivery) {
        let registry = Arc::clone(&self.registry);
        let permits = Arc::clone(&self.permits);
        let log_tx = self.log_tx.clone();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let log = deliver(&registry, delivery).await;
            if log_tx.send(log).await.is_err() {
                tracing::debug!("notification log writer closed");
            }
        });
    }
}

/// Exactly one attempt at the channel; lookup failures are reported like send failures.
async fn deliver(registry: &ChannelRegistry, delivery: Delivery) -> NotificationLog {
    let result = match registry.get(delivery.channel_id).await {
        Ok(ch) => ch.send(&delivery.message, &delivery.event).await,
        Err(e) => Err(e),
    };
    match &result {
        Ok(()) => tracing::debug!(
            channel_id = delivery.channel_id,
            rule_id = delivery.rule_id,
            event_type = %delivery.event.event_type,
            container = %delivery.event.container_name,
            "notification sent"
        ),
        Err(e) => tracing::warn!(
            error = %e,
            channel_id = delivery.channel_id,
            rule_id = delivery.rule_id,
            event_type = %delivery.event.event_type,
            container = %delivery.event.container_name,
            "notification delivery failed"
        ),
    }
    delivery.into_log(result)
}

pub fn log_channel() -> (mpsc::Sender<NotificationLog>, mpsc::Receiver<NotificationLog>) {
    mpsc::channel(LOG_CHANNEL_CAPACITY)
}

/// Spawns the task that persists delivery outcomes. A successful threshold delivery is recorded
/// on that container's tracker. Exits once every sender is dropped.
pub fn spawn_log_writer(
    mut log_rx: mpsc::Receiver<NotificationLog>,
    store: Arc<dyn Store>,
    trackers: Arc<ThresholdTrackers>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(log) = log_rx.recv().await {
            if log.success
                && let Some(kind) = ThresholdKind::from_event_type(log.event_type)
                && let Some(host_id) = log.host_id
            {
                trackers.reset(&log.container_id, host_id, kind, log.sent_at);
            }
            if let Err(e) = store.save_notification_log(&log).await {
                tracing::warn!(
                    error = %e,
                    operation = "save_notification_log",
                    event_type = %log.event_type,
                    "failed to save notification log"
                );
            }
        }
        tracing::debug!("Notification log writer shutting down");
    })
}

// Notification engine: detect → match rules → silence → rate limit → dispatch.

pub mod baseline;
pub mod channels;
pub mod detect;
pub mod dispatch;
mod error;
pub mod message;
pub mod ratelimit;
pub mod rules;
pub mod silence;
pub mod threshold;

pub use baseline::{BaselineCollector, BaselineUpdateSummary};
pub use dispatch::{ChannelRegistry, Delivery, Dispatcher};
pub use error::NotifyError;
pub use ratelimit::{RateLimiter, RateLimiterStats};
pub use rules::NotificationTask;
pub use threshold::{ThresholdKind, ThresholdTrackers};

use crate::config::NotificationConfig;
use crate::models::{EventType, Metadata, NotificationEvent};
use crate::store::Store;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::instrument;

/// Counters from one `process_events` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub events: usize,
    pub tasks: usize,
    pub dispatched: usize,
    pub queued: usize,
}

pub struct NotificationService {
    store: Arc<dyn Store>,
    baseline: Arc<BaselineCollector>,
    trackers: Arc<ThresholdTrackers>,
    rate_limiter: Arc<RateLimiter>,
    registry: Arc<ChannelRegistry>,
    dispatcher: Dispatcher,
    threshold_duration: chrono::Duration,
    lifecycle_window: chrono::Duration,
    anomaly_threshold: f64,
}

impl NotificationService {
    /// Builds the engine and spawns its delivery-log writer, which runs until the service
    /// and all in-flight deliveries are dropped.
    pub fn new(
        store: Arc<dyn Store>,
        baseline: Arc<BaselineCollector>,
        config: &NotificationConfig,
    ) -> Self {
        let trackers = Arc::new(ThresholdTrackers::new());
        let registry = Arc::new(ChannelRegistry::new(Arc::clone(&store)));
        let (log_tx, log_rx) = dispatch::log_channel();
        dispatch::spawn_log_writer(log_rx, Arc::clone(&store), Arc::clone(&trackers));
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry), config.max_concurrent_sends, log_tx),
            rate_limiter: Arc::new(RateLimiter::new(
                config.max_per_hour,
                Duration::from_secs(config.batch_interval_secs),
            )),
            threshold_duration: chrono::Duration::seconds(config.threshold_duration_secs as i64),
            lifecycle_window: chrono::Duration::seconds(config.lifecycle_window_secs as i64),
            anomaly_threshold: config.anomaly_threshold,
            store,
            baseline,
            trackers,
            registry,
        }
    }

    /// Entry point after each host scan. Detector failures are logged and skipped
    /// independently; delivery happens in the background.
    #[instrument(skip(self), fields(operation = "process_events"))]
    pub async fn process_events(&self, host_id: i64) -> anyhow::Result<ProcessSummary> {
        let now = Utc::now();
        let store = self.store.as_ref();
        let mut events = Vec::new();

        match detect::detect_lifecycle_events(
            store,
            &self.baseline,
            host_id,
            now,
            self.lifecycle_window,
        )
        .await
        {
            Ok(found) => events.extend(found),
            Err(e) => tracing::warn!(error = %e, host_id, detector = "lifecycle", "detector failed"),
        }
        match detect::detect_threshold_events(
            store,
            &self.trackers,
            host_id,
            now,
            self.threshold_duration,
        )
        .await
        {
            Ok(found) => events.extend(found),
            Err(e) => tracing::warn!(error = %e, host_id, detector = "threshold", "detector failed"),
        }
        match detect::detect_anomalies(store, host_id, self.anomaly_threshold).await {
            Ok(found) => events.extend(found),
            Err(e) => tracing::warn!(error = %e, host_id, detector = "anomaly", "detector failed"),
        }

        let mut summary = ProcessSummary {
            events: events.len(),
            ..Default::default()
        };
        if events.is_empty() {
            return Ok(summary);
        }
        tracing::info!(host_id, events = events.len(), "processing notification events");

        let rules = store.get_notification_rules(true).await?;
        let tasks = rules::match_rules(store, &rules, &events, now).await;
        let tasks = match store.get_active_silences().await {
            Ok(silences) => silence::filter_silenced(tasks, &silences, now),
            Err(e) => {
                tracing::warn!(error = %e, operation = "get_active_silences", "silence lookup failed");
                tasks
            }
        };
        summary.tasks = tasks.len();

        for task in tasks {
            if self.rate_limiter.allow() {
                self.dispatcher.dispatch(task.into());
                summary.dispatched += 1;
            } else {
                tracing::info!(
                    rule = %task.rule_name,
                    channel_id = task.channel_id,
                    container = %task.event.container_name,
                    "rate limited, queued for batch summary"
                );
                self.rate_limiter.add_to_batch(task);
                summary.queued += 1;
            }
        }
        Ok(summary)
    }

    /// Sends one summary per channel for everything the rate limiter held back.
    /// The queue is emptied whatever the outcome. Returns the number of summaries dispatched.
    pub fn flush_batch(&self) -> usize {
        let queued = self.rate_limiter.drain_batch();
        if queued.is_empty() {
            return 0;
        }
        let mut by_channel: BTreeMap<i64, BTreeMap<EventType, usize>> = BTreeMap::new();
        for task in &queued {
            *by_channel
                .entry(task.channel_id)
                .or_default()
                .entry(task.event.event_type)
                .or_default() += 1;
        }
        tracing::info!(
            queued = queued.len(),
            channels = by_channel.len(),
            "flushing rate-limited notifications"
        );

        let summaries = by_channel.len();
        for (channel_id, counts) in by_channel {
            let mut metadata = Metadata::new();
            metadata.insert("total".into(), json!(counts.values().sum::<usize>()));
            for (event_type, n) in &counts {
                metadata.insert(event_type.as_str().into(), json!(n));
            }
            let event = NotificationEvent {
                event_type: EventType::BatchSummary,
                timestamp: Utc::now(),
                container_id: String::new(),
                container_name: String::new(),
                host_id: 0,
                host_name: String::new(),
                image: String::new(),
                old_state: None,
                new_state: None,
                old_image: None,
                new_image: None,
                cpu_percent: None,
                memory_percent: None,
                metadata,
            };
            self.dispatcher.dispatch(Delivery {
                rule_id: None,
                channel_id,
                message: message::build_batch_summary(&counts),
                event,
            });
        }
        summaries
    }

    /// Flushes the batch queue every batch interval until shutdown.
    pub fn spawn_batch_flusher(
        self: Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.rate_limiter.batch_interval();
            let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        self.flush_batch();
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::debug!("Batch flusher shutting down");
                        break;
                    }
                }
            }
        })
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Drops cached channel instances; call after any channel edit.
    pub async fn refresh_channels(&self) {
        self.registry.clear().await;
        tracing::debug!("notification channel cache cleared");
    }

    /// Runs the channel's test delivery with a freshly loaded configuration.
    #[instrument(skip(self), fields(operation = "send_test_notification"))]
    pub async fn send_test_notification(&self, channel_id: i64) -> Result<(), NotifyError> {
        let channel = self.registry.load_fresh(channel_id).await?;
        channel.test().await?;
        tracing::info!(
            channel = %channel.name(),
            channel_type = channel.channel_type(),
            "test notification sent"
        );
        Ok(())
    }

    /// Records a delivered breach. The breach is not reported again until it ends.
    pub fn reset_threshold(&self, container_id: &str, host_id: i64, kind: ThresholdKind) {
        self.trackers.reset(container_id, host_id, kind, Utc::now());
    }

    pub fn threshold_trackers(&self) -> &ThresholdTrackers {
        &self.trackers
    }

    pub fn channel_registry(&self) -> &ChannelRegistry {
        &self.registry
    }
}

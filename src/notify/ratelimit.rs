// Token bucket with a queue for notifications that did not get a token.

use super::rules::NotificationTask;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

const REFILL_PERIOD: Duration = Duration::from_secs(3600);

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    queue: Vec<NotificationTask>,
}

impl Bucket {
    fn refill(&mut self, now: Instant, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * capacity / REFILL_PERIOD.as_secs_f64()).min(capacity);
            self.last_refill = now;
        }
    }
}

/// Point-in-time view of the limiter, served to the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterStats {
    pub current_tokens: f64,
    pub capacity: u32,
    pub queued: usize,
    pub batch_interval_secs: u64,
    /// Seconds until the bucket is full again.
    pub next_reset_secs: u64,
}

/// Global admission control: `capacity` notifications per hour, refilled continuously.
pub struct RateLimiter {
    capacity: u32,
    batch_interval: Duration,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(max_per_hour: u32, batch_interval: Duration) -> Self {
        Self {
            capacity: max_per_hour,
            batch_interval,
            bucket: Mutex::new(Bucket {
                tokens: max_per_hour as f64,
                last_refill: Instant::now(),
                queue: Vec::new(),
            }),
        }
    }

    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Takes one token if available.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock();
        bucket.refill(now, self.capacity as f64);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn add_to_batch(&self, task: NotificationTask) {
        self.bucket.lock().queue.push(task);
    }

    /// Takes everything queued so far.
    pub fn drain_batch(&self) -> Vec<NotificationTask> {
        std::mem::take(&mut self.bucket.lock().queue)
    }

    pub fn batch_interval(&self) -> Duration {
        self.batch_interval
    }

    pub fn stats(&self) -> RateLimiterStats {
        self.stats_at(Instant::now())
    }

    pub fn stats_at(&self, now: Instant) -> RateLimiterStats {
        let mut bucket = self.bucket.lock();
        let capacity = self.capacity as f64;
        bucket.refill(now, capacity);
        let missing = capacity - bucket.tokens;
        let next_reset_secs = if capacity > 0.0 {
            (missing * REFILL_PERIOD.as_secs_f64() / capacity).ceil() as u64
        } else {
            0
        };
        RateLimiterStats {
            current_tokens: bucket.tokens,
            capacity: self.capacity,
            queued: bucket.queue.len(),
            batch_interval_secs: self.batch_interval.as_secs(),
            next_reset_secs,
        }
    }
}

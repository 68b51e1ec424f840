use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
    /// Log rows older than this are pruned, unless among the newest `notification_keep_recent`.
    #[serde(default = "default_notification_retention_days")]
    pub notification_retention_days: u32,
    #[serde(default = "default_notification_keep_recent")]
    pub notification_keep_recent: u32,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Container scan rows older than this are pruned. Must cover the baseline window.
    #[serde(default = "default_snapshot_retention_days")]
    pub snapshot_retention_days: u32,
    /// Optional cron expression for VACUUM (e.g. "0 3 * * *" = 03:00 daily). Uses local time.
    #[serde(default)]
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    #[serde(default = "default_vacuum_interval_secs")]
    pub vacuum_interval_secs: u64,
}

fn default_notification_retention_days() -> u32 {
    7
}

fn default_notification_keep_recent() -> u32 {
    100
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_snapshot_retention_days() -> u32 {
    7
}

fn default_vacuum_interval_secs() -> u64 {
    7 * 24 * 3600
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Token bucket capacity; refilled continuously over one hour.
    pub max_per_hour: u32,
    /// How often rate-limited notifications are flushed as one summary per channel.
    pub batch_interval_secs: u64,
    /// How long a CPU/memory breach must persist before it is reported.
    pub threshold_duration_secs: u64,
    /// Lifecycle transitions older than this are not reported.
    pub lifecycle_window_secs: u64,
    /// Relative increase over baseline that counts as anomalous (0.25 = 25%).
    pub anomaly_threshold: f64,
    /// Cap on in-flight channel deliveries.
    pub max_concurrent_sends: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_per_hour: 100,
            batch_interval_secs: 600,
            threshold_duration_secs: 120,
            lifecycle_window_secs: 300,
            anomaly_threshold: 0.25,
            max_concurrent_sends: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub update_interval_secs: u64,
    pub window_hours: u32,
    /// Fewer qualifying samples than this yields no baseline.
    pub min_samples: u32,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 3600,
            window_hours: 48,
            min_samples: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Name the local Docker host is registered under.
    pub host_name: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            host_name: "local".into(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        let mut config = Self::load_from_str(&s)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// NOTIFICATION_RATE_LIMIT_MAX and NOTIFICATION_RATE_LIMIT_BATCH_INTERVAL (seconds) win over the file.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(v) = std::env::var("NOTIFICATION_RATE_LIMIT_MAX") {
            self.notifications.max_per_hour = v
                .parse()
                .map_err(|e| anyhow::anyhow!("NOTIFICATION_RATE_LIMIT_MAX: {}", e))?;
        }
        if let Ok(v) = std::env::var("NOTIFICATION_RATE_LIMIT_BATCH_INTERVAL") {
            self.notifications.batch_interval_secs = v
                .parse()
                .map_err(|e| anyhow::anyhow!("NOTIFICATION_RATE_LIMIT_BATCH_INTERVAL: {}", e))?;
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.database.notification_retention_days > 0,
            "database.notification_retention_days must be > 0, got {}",
            self.database.notification_retention_days
        );
        anyhow::ensure!(
            self.database.cleanup_interval_secs > 0,
            "database.cleanup_interval_secs must be > 0, got {}",
            self.database.cleanup_interval_secs
        );
        anyhow::ensure!(
            self.database.vacuum_interval_secs > 0,
            "database.vacuum_interval_secs must be > 0, got {}",
            self.database.vacuum_interval_secs
        );
        anyhow::ensure!(
            self.notifications.max_per_hour > 0,
            "notifications.max_per_hour must be > 0, got {}",
            self.notifications.max_per_hour
        );
        anyhow::ensure!(
            self.notifications.batch_interval_secs > 0,
            "notifications.batch_interval_secs must be > 0, got {}",
            self.notifications.batch_interval_secs
        );
        anyhow::ensure!(
            self.notifications.lifecycle_window_secs > 0,
            "notifications.lifecycle_window_secs must be > 0, got {}",
            self.notifications.lifecycle_window_secs
        );
        anyhow::ensure!(
            self.notifications.anomaly_threshold > 0.0,
            "notifications.anomaly_threshold must be > 0, got {}",
            self.notifications.anomaly_threshold
        );
        anyhow::ensure!(
            self.notifications.max_concurrent_sends > 0,
            "notifications.max_concurrent_sends must be > 0, got {}",
            self.notifications.max_concurrent_sends
        );
        anyhow::ensure!(
            self.baseline.update_interval_secs > 0,
            "baseline.update_interval_secs must be > 0, got {}",
            self.baseline.update_interval_secs
        );
        anyhow::ensure!(
            self.baseline.window_hours > 0,
            "baseline.window_hours must be > 0, got {}",
            self.baseline.window_hours
        );
        anyhow::ensure!(
            self.baseline.min_samples > 0,
            "baseline.min_samples must be > 0, got {}",
            self.baseline.min_samples
        );
        anyhow::ensure!(
            u64::from(self.database.snapshot_retention_days) * 24
                >= u64::from(self.baseline.window_hours),
            "database.snapshot_retention_days ({}) must cover baseline.window_hours ({})",
            self.database.snapshot_retention_days,
            self.baseline.window_hours
        );
        anyhow::ensure!(
            self.scanner.interval_secs > 0,
            "scanner.interval_secs must be > 0, got {}",
            self.scanner.interval_secs
        );
        anyhow::ensure!(
            !self.scanner.host_name.is_empty(),
            "scanner.host_name must be non-empty"
        );
        Ok(())
    }
}

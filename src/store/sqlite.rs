// SQLite persistence: hosts, container scans, baselines and notification tables.

use super::{Store, lifecycle::derive_lifecycle_events};
use crate::models::{
    ContainerBaselineStats, ContainerSnapshot, ContainerState, EventType, Host, LifecycleEvent,
    Metadata, NotificationChannel, NotificationLog, NotificationRule, NotificationSilence,
    NotificationStatus, StatsPoint,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

/// Upper bound on scan rows read for one container's lifecycle derivation.
const MAX_LIFECYCLE_ROWS: i64 = 1000;

/// Upper bound on stats samples returned per query (48h at a 1-minute scan interval).
const MAX_STATS_SAMPLES: i64 = 2880;

const CONTAINER_COLUMNS: &str = "container_id, name, host_id, host_name, image, image_id, state, cpu_percent, memory_usage, memory_limit, memory_percent, restart_count, scanned_at";

const LOG_COLUMNS: &str = "id, rule_id, channel_id, event_type, container_id, container_name, host_id, host_name, message, metadata, sent_at, success, error, read";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS hosts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                enabled INTEGER NOT NULL DEFAULT 1,
                collect_stats INTEGER NOT NULL DEFAULT 1,
                last_scan_at INTEGER
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS containers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                container_id TEXT NOT NULL,
                name TEXT NOT NULL,
                host_id INTEGER NOT NULL,
                host_name TEXT NOT NULL,
                image TEXT NOT NULL,
                image_id TEXT NOT NULL,
                state TEXT NOT NULL,
                cpu_percent REAL NOT NULL DEFAULT 0,
                memory_usage INTEGER NOT NULL DEFAULT 0,
                memory_limit INTEGER NOT NULL DEFAULT 0,
                memory_percent REAL NOT NULL DEFAULT 0,
                restart_count INTEGER NOT NULL DEFAULT 0,
                scanned_at INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_containers_host_scan ON containers(host_id, scanned_at)",
            "CREATE INDEX IF NOT EXISTS idx_containers_name_host ON containers(name, host_id, scanned_at)",
            "CREATE INDEX IF NOT EXISTS idx_containers_id_host ON containers(container_id, host_id, scanned_at)",
            r#"
            CREATE TABLE IF NOT EXISTS container_baseline_stats (
                container_id TEXT NOT NULL,
                host_id INTEGER NOT NULL,
                container_name TEXT NOT NULL,
                image_id TEXT NOT NULL,
                avg_cpu_percent REAL NOT NULL,
                avg_memory_percent REAL NOT NULL,
                avg_memory_usage INTEGER NOT NULL,
                sample_count INTEGER NOT NULL,
                window_start INTEGER NOT NULL,
                window_end INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (container_id, host_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS notification_channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                type TEXT NOT NULL,
                config TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS notification_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                enabled INTEGER NOT NULL DEFAULT 1,
                event_types TEXT NOT NULL,
                host_id INTEGER,
                container_pattern TEXT,
                image_pattern TEXT,
                cpu_threshold REAL,
                memory_threshold REAL,
                threshold_duration_seconds INTEGER NOT NULL DEFAULT 120,
                cooldown_seconds INTEGER NOT NULL DEFAULT 300
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS notification_rule_channels (
                rule_id INTEGER NOT NULL REFERENCES notification_rules(id) ON DELETE CASCADE,
                channel_id INTEGER NOT NULL REFERENCES notification_channels(id) ON DELETE CASCADE,
                PRIMARY KEY (rule_id, channel_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS notification_silences (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host_id INTEGER,
                container_id TEXT,
                container_pattern TEXT,
                silenced_until INTEGER NOT NULL,
                reason TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_silences_until ON notification_silences(silenced_until)",
            r#"
            CREATE TABLE IF NOT EXISTS notification_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rule_id INTEGER,
                channel_id INTEGER,
                event_type TEXT NOT NULL,
                container_id TEXT NOT NULL DEFAULT '',
                container_name TEXT NOT NULL DEFAULT '',
                host_id INTEGER,
                host_name TEXT NOT NULL DEFAULT '',
                message TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                sent_at INTEGER NOT NULL,
                success INTEGER NOT NULL,
                error TEXT,
                read INTEGER NOT NULL DEFAULT 0
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_log_sent_at ON notification_log(sent_at)",
            "CREATE INDEX IF NOT EXISTS idx_log_cooldown ON notification_log(rule_id, container_id, host_id, sent_at)",
            "CREATE INDEX IF NOT EXISTS idx_log_read ON notification_log(read)",
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Register a host by name, or update its stats flag if it already exists.
    #[instrument(skip(self), fields(repo = "store", operation = "upsert_host"))]
    pub async fn upsert_host(&self, name: &str, collect_stats: bool) -> anyhow::Result<Host> {
        let row = sqlx::query(
            r#"
            INSERT INTO hosts (name, enabled, collect_stats) VALUES ($1, 1, $2)
            ON CONFLICT(name) DO UPDATE SET collect_stats = excluded.collect_stats
            RETURNING id, name, enabled, collect_stats
            "#,
        )
        .bind(name)
        .bind(collect_stats)
        .fetch_one(&self.pool)
        .await?;
        host_from_row(&row)
    }

    #[instrument(skip(self), fields(repo = "store", operation = "set_host_enabled"))]
    pub async fn set_host_enabled(&self, host_id: i64, enabled: bool) -> anyhow::Result<()> {
        sqlx::query("UPDATE hosts SET enabled = $1 WHERE id = $2")
            .bind(enabled)
            .bind(host_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records a completed scan of `host_id`, even one that found no containers.
    /// Only rows stamped with the latest scan time count as the host's current containers.
    #[instrument(skip(self), fields(repo = "store", operation = "mark_host_scanned"))]
    pub async fn mark_host_scanned(
        &self,
        host_id: i64,
        scanned_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE hosts SET last_scan_at = MAX(COALESCE(last_scan_at, 0), $1) WHERE id = $2")
            .bind(scanned_at.timestamp_millis())
            .bind(host_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, snapshots), fields(repo = "store", operation = "save_containers", snapshots_count = snapshots.len()))]
    pub async fn save_containers(&self, snapshots: &[ContainerSnapshot]) -> anyhow::Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for s in snapshots {
            sqlx::query(
                "UPDATE hosts SET last_scan_at = MAX(COALESCE(last_scan_at, 0), $1) WHERE id = $2",
            )
            .bind(s.scanned_at.timestamp_millis())
            .bind(s.host_id)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "INSERT INTO containers (container_id, name, host_id, host_name, image, image_id, state, cpu_percent, memory_usage, memory_limit, memory_percent, restart_count, scanned_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(&s.id)
            .bind(&s.name)
            .bind(s.host_id)
            .bind(&s.host_name)
            .bind(&s.image)
            .bind(&s.image_id)
            .bind(s.state.as_str())
            .bind(s.cpu_percent)
            .bind(s.memory_usage as i64)
            .bind(s.memory_limit as i64)
            .bind(s.memory_percent)
            .bind(s.restart_count as i64)
            .bind(s.scanned_at.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Deletes scan rows older than `retention_days`.
    #[instrument(skip(self), fields(repo = "store", operation = "prune_container_history"))]
    pub async fn prune_container_history(&self, retention_days: u32) -> anyhow::Result<u64> {
        let cutoff = millis_ago(Duration::days(i64::from(retention_days)));
        let result = sqlx::query("DELETE FROM containers WHERE scanned_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(repo = "store", operation = "get_notification_channels"))]
    pub async fn get_notification_channels(&self) -> anyhow::Result<Vec<NotificationChannel>> {
        let rows = sqlx::query("SELECT id, name, type, config, enabled FROM notification_channels ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(channel_from_row).collect()
    }

    /// Inserts when `id == 0`, otherwise updates. Returns the row id.
    #[instrument(skip(self, channel), fields(repo = "store", operation = "save_notification_channel", channel = %channel.name))]
    pub async fn save_notification_channel(
        &self,
        channel: &NotificationChannel,
    ) -> anyhow::Result<i64> {
        let config = serde_json::to_string(&channel.config)?;
        if channel.id == 0 {
            let row = sqlx::query(
                "INSERT INTO notification_channels (name, type, config, enabled) VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .bind(&channel.name)
            .bind(&channel.channel_type)
            .bind(&config)
            .bind(channel.enabled)
            .fetch_one(&self.pool)
            .await?;
            return Ok(row.try_get("id")?);
        }
        let result = sqlx::query(
            "UPDATE notification_channels SET name = $1, type = $2, config = $3, enabled = $4 WHERE id = $5",
        )
        .bind(&channel.name)
        .bind(&channel.channel_type)
        .bind(&config)
        .bind(channel.enabled)
        .bind(channel.id)
        .execute(&self.pool)
        .await?;
        anyhow::ensure!(
            result.rows_affected() > 0,
            "notification channel {} not found",
            channel.id
        );
        Ok(channel.id)
    }

    #[instrument(skip(self), fields(repo = "store", operation = "delete_notification_channel"))]
    pub async fn delete_notification_channel(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM notification_channels WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts when `id == 0`, otherwise updates. Channel links are replaced. Returns the row id.
    #[instrument(skip(self, rule), fields(repo = "store", operation = "save_notification_rule", rule = %rule.name))]
    pub async fn save_notification_rule(&self, rule: &NotificationRule) -> anyhow::Result<i64> {
        let event_types = serde_json::to_string(&rule.event_types)?;
        let mut tx = self.pool.begin().await?;
        let id = if rule.id == 0 {
            let row = sqlx::query(
                "INSERT INTO notification_rules (name, enabled, event_types, host_id, container_pattern, image_pattern, cpu_threshold, memory_threshold, threshold_duration_seconds, cooldown_seconds) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING id",
            )
            .bind(&rule.name)
            .bind(rule.enabled)
            .bind(&event_types)
            .bind(rule.host_id)
            .bind(&rule.container_pattern)
            .bind(&rule.image_pattern)
            .bind(rule.cpu_threshold)
            .bind(rule.memory_threshold)
            .bind(rule.threshold_duration_secs as i64)
            .bind(rule.cooldown_secs as i64)
            .fetch_one(&mut *tx)
            .await?;
            row.try_get::<i64, _>("id")?
        } else {
            let result = sqlx::query(
                "UPDATE notification_rules SET name = $1, enabled = $2, event_types = $3, host_id = $4, container_pattern = $5, image_pattern = $6, cpu_threshold = $7, memory_threshold = $8, threshold_duration_seconds = $9, cooldown_seconds = $10 WHERE id = $11",
            )
            .bind(&rule.name)
            .bind(rule.enabled)
            .bind(&event_types)
            .bind(rule.host_id)
            .bind(&rule.container_pattern)
            .bind(&rule.image_pattern)
            .bind(rule.cpu_threshold)
            .bind(rule.memory_threshold)
            .bind(rule.threshold_duration_secs as i64)
            .bind(rule.cooldown_secs as i64)
            .bind(rule.id)
            .execute(&mut *tx)
            .await?;
            anyhow::ensure!(
                result.rows_affected() > 0,
                "notification rule {} not found",
                rule.id
            );
            sqlx::query("DELETE FROM notification_rule_channels WHERE rule_id = $1")
                .bind(rule.id)
                .execute(&mut *tx)
                .await?;
            rule.id
        };
        for channel_id in &rule.channel_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO notification_rule_channels (rule_id, channel_id) VALUES ($1, $2)",
            )
            .bind(id)
            .bind(channel_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(id)
    }

    #[instrument(skip(self), fields(repo = "store", operation = "delete_notification_rule"))]
    pub async fn delete_notification_rule(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM notification_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts when `id == 0`, otherwise updates. Returns the row id.
    #[instrument(skip(self, silence), fields(repo = "store", operation = "save_notification_silence"))]
    pub async fn save_notification_silence(
        &self,
        silence: &NotificationSilence,
    ) -> anyhow::Result<i64> {
        let until = silence.silenced_until.timestamp_millis();
        if silence.id == 0 {
            let row = sqlx::query(
                "INSERT INTO notification_silences (host_id, container_id, container_pattern, silenced_until, reason, created_at) VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            )
            .bind(silence.host_id)
            .bind(&silence.container_id)
            .bind(&silence.container_pattern)
            .bind(until)
            .bind(&silence.reason)
            .bind(Utc::now().timestamp_millis())
            .fetch_one(&self.pool)
            .await?;
            return Ok(row.try_get("id")?);
        }
        sqlx::query(
            "UPDATE notification_silences SET host_id = $1, container_id = $2, container_pattern = $3, silenced_until = $4, reason = $5 WHERE id = $6",
        )
        .bind(silence.host_id)
        .bind(&silence.container_id)
        .bind(&silence.container_pattern)
        .bind(until)
        .bind(&silence.reason)
        .bind(silence.id)
        .execute(&self.pool)
        .await?;
        Ok(silence.id)
    }

    #[instrument(skip(self), fields(repo = "store", operation = "delete_notification_silence"))]
    pub async fn delete_notification_silence(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM notification_silences WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Newest first.
    #[instrument(skip(self), fields(repo = "store", operation = "get_notification_logs"))]
    pub async fn get_notification_logs(
        &self,
        limit: u32,
        unread_only: bool,
    ) -> anyhow::Result<Vec<NotificationLog>> {
        let sql = if unread_only {
            format!("SELECT {LOG_COLUMNS} FROM notification_log WHERE read = 0 ORDER BY sent_at DESC, id DESC LIMIT $1")
        } else {
            format!("SELECT {LOG_COLUMNS} FROM notification_log ORDER BY sent_at DESC, id DESC LIMIT $1")
        };
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(log_from_row).collect()
    }

    /// Returns false when no such log row exists.
    #[instrument(skip(self), fields(repo = "store", operation = "mark_notification_read"))]
    pub async fn mark_notification_read(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE notification_log SET read = 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(repo = "store", operation = "mark_all_notifications_read"))]
    pub async fn mark_all_notifications_read(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("UPDATE notification_log SET read = 1 WHERE read = 0")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn get_unread_notification_count(&self) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM notification_log WHERE read = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    #[instrument(skip(self), fields(repo = "store", operation = "get_notification_status"))]
    pub async fn get_notification_status(&self) -> anyhow::Result<NotificationStatus> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM notification_log WHERE read = 0) AS unread_count,
                (SELECT COUNT(*) FROM notification_channels) AS total_channels,
                (SELECT COUNT(*) FROM notification_channels WHERE enabled = 1) AS enabled_channels,
                (SELECT COUNT(*) FROM notification_rules) AS total_rules,
                (SELECT COUNT(*) FROM notification_rules WHERE enabled = 1) AS enabled_rules,
                (SELECT COUNT(*) FROM notification_log WHERE success = 0 AND sent_at >= $1) AS recent_failures,
                (SELECT COUNT(*) FROM notification_silences WHERE silenced_until >= $2) AS active_silences
            "#,
        )
        .bind((now - Duration::hours(24)).timestamp_millis())
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(NotificationStatus {
            unread_count: row.try_get("unread_count")?,
            total_channels: row.try_get("total_channels")?,
            enabled_channels: row.try_get("enabled_channels")?,
            total_rules: row.try_get("total_rules")?,
            enabled_rules: row.try_get("enabled_rules")?,
            recent_failures: row.try_get("recent_failures")?,
            active_silences: row.try_get("active_silences")?,
        })
    }

    /// Deletes log rows older than `retention_days` that are not among the newest `keep_recent`.
    #[instrument(skip(self), fields(repo = "store", operation = "cleanup_old_notifications"))]
    pub async fn cleanup_old_notifications(
        &self,
        retention_days: u32,
        keep_recent: u32,
    ) -> anyhow::Result<u64> {
        let cutoff = millis_ago(Duration::days(i64::from(retention_days)));
        let result = sqlx::query(
            r#"
            DELETE FROM notification_log
            WHERE sent_at < $1
              AND id NOT IN (
                SELECT id FROM notification_log ORDER BY sent_at DESC, id DESC LIMIT $2
              )
            "#,
        )
        .bind(cutoff)
        .bind(keep_recent as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Runs VACUUM to reclaim space. Call after large deletes (e.g. log cleanup).
    #[instrument(skip(self), fields(repo = "store", operation = "vacuum"))]
    pub async fn vacuum(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    #[instrument(skip(self), fields(repo = "store", operation = "get_hosts"))]
    async fn get_hosts(&self) -> anyhow::Result<Vec<Host>> {
        let rows = sqlx::query("SELECT id, name, enabled, collect_stats FROM hosts ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(host_from_row).collect()
    }

    #[instrument(skip(self), fields(repo = "store", operation = "get_containers_by_host"))]
    async fn get_containers_by_host(&self, host_id: i64) -> anyhow::Result<Vec<ContainerSnapshot>> {
        let sql = format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers WHERE host_id = $1 AND scanned_at = (SELECT last_scan_at FROM hosts WHERE id = $2) ORDER BY name"
        );
        let rows = sqlx::query(&sql)
            .bind(host_id)
            .bind(host_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(container_from_row).collect()
    }

    #[instrument(skip(self), fields(repo = "store", operation = "get_container_lifecycle_events"))]
    async fn get_container_lifecycle_events(
        &self,
        container_name: &str,
        host_id: i64,
    ) -> anyhow::Result<Vec<LifecycleEvent>> {
        let sql = format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers WHERE name = $1 AND host_id = $2 ORDER BY scanned_at DESC LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(container_name)
            .bind(host_id)
            .bind(MAX_LIFECYCLE_ROWS)
            .fetch_all(&self.pool)
            .await?;
        let mut snapshots = rows
            .iter()
            .map(container_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        snapshots.reverse();
        Ok(derive_lifecycle_events(&snapshots))
    }

    #[instrument(skip(self), fields(repo = "store", operation = "get_container_stats"))]
    async fn get_container_stats(
        &self,
        container_id: &str,
        host_id: i64,
        hours: u32,
    ) -> anyhow::Result<Vec<StatsPoint>> {
        let since = millis_ago(Duration::hours(i64::from(hours)));
        let rows = sqlx::query(
            "SELECT scanned_at, cpu_percent, memory_usage, memory_limit, memory_percent FROM containers WHERE container_id = $1 AND host_id = $2 AND scanned_at >= $3 ORDER BY scanned_at DESC LIMIT $4",
        )
        .bind(container_id)
        .bind(host_id)
        .bind(since)
        .bind(MAX_STATS_SAMPLES)
        .fetch_all(&self.pool)
        .await?;
        let mut points = rows
            .iter()
            .map(|row| {
                Ok(StatsPoint {
                    timestamp: from_millis(row.try_get("scanned_at")?)?,
                    cpu_percent: row.try_get("cpu_percent")?,
                    memory_usage: to_u64(row.try_get("memory_usage")?),
                    memory_limit: to_u64(row.try_get("memory_limit")?),
                    memory_percent: row.try_get("memory_percent")?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        points.reverse();
        Ok(points)
    }

    #[instrument(skip(self), fields(repo = "store", operation = "get_container_baseline"))]
    async fn get_container_baseline(
        &self,
        container_id: &str,
        host_id: i64,
    ) -> anyhow::Result<Option<ContainerBaselineStats>> {
        let row = sqlx::query(
            "SELECT container_id, host_id, container_name, image_id, avg_cpu_percent, avg_memory_percent, avg_memory_usage, sample_count, window_start, window_end FROM container_baseline_stats WHERE container_id = $1 AND host_id = $2",
        )
        .bind(container_id)
        .bind(host_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(ContainerBaselineStats {
            container_id: row.try_get("container_id")?,
            container_name: row.try_get("container_name")?,
            host_id: row.try_get("host_id")?,
            image_id: row.try_get("image_id")?,
            avg_cpu_percent: row.try_get("avg_cpu_percent")?,
            avg_memory_percent: row.try_get("avg_memory_percent")?,
            avg_memory_usage: to_u64(row.try_get("avg_memory_usage")?),
            sample_count: row.try_get::<i64, _>("sample_count")?.clamp(0, u32::MAX as i64) as u32,
            window_start: from_millis(row.try_get("window_start")?)?,
            window_end: from_millis(row.try_get("window_end")?)?,
        }))
    }

    #[instrument(skip(self, baseline), fields(repo = "store", operation = "save_container_baseline", container = %baseline.container_name))]
    async fn save_container_baseline(
        &self,
        baseline: &ContainerBaselineStats,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO container_baseline_stats (container_id, host_id, container_name, image_id, avg_cpu_percent, avg_memory_percent, avg_memory_usage, sample_count, window_start, window_end, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&baseline.container_id)
        .bind(baseline.host_id)
        .bind(&baseline.container_name)
        .bind(&baseline.image_id)
        .bind(baseline.avg_cpu_percent)
        .bind(baseline.avg_memory_percent)
        .bind(baseline.avg_memory_usage as i64)
        .bind(baseline.sample_count as i64)
        .bind(baseline.window_start.timestamp_millis())
        .bind(baseline.window_end.timestamp_millis())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "store", operation = "get_notification_rules"))]
    async fn get_notification_rules(
        &self,
        enabled_only: bool,
    ) -> anyhow::Result<Vec<NotificationRule>> {
        let sql = if enabled_only {
            "SELECT id, name, enabled, event_types, host_id, container_pattern, image_pattern, cpu_threshold, memory_threshold, threshold_duration_seconds, cooldown_seconds FROM notification_rules WHERE enabled = 1 ORDER BY id"
        } else {
            "SELECT id, name, enabled, event_types, host_id, container_pattern, image_pattern, cpu_threshold, memory_threshold, threshold_duration_seconds, cooldown_seconds FROM notification_rules ORDER BY id"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let links = sqlx::query(
            "SELECT rule_id, channel_id FROM notification_rule_channels ORDER BY rule_id, channel_id",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut channels: HashMap<i64, Vec<i64>> = HashMap::new();
        for link in &links {
            channels
                .entry(link.try_get("rule_id")?)
                .or_default()
                .push(link.try_get("channel_id")?);
        }

        let mut rules = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let event_types: String = row.try_get("event_types")?;
            rules.push(NotificationRule {
                id,
                name: row.try_get("name")?,
                enabled: row.try_get("enabled")?,
                event_types: serde_json::from_str(&event_types)?,
                host_id: row.try_get("host_id")?,
                container_pattern: row.try_get("container_pattern")?,
                image_pattern: row.try_get("image_pattern")?,
                cpu_threshold: row.try_get("cpu_threshold")?,
                memory_threshold: row.try_get("memory_threshold")?,
                threshold_duration_secs: to_u64(row.try_get("threshold_duration_seconds")?),
                cooldown_secs: to_u64(row.try_get("cooldown_seconds")?),
                channel_ids: channels.remove(&id).unwrap_or_default(),
            });
        }
        Ok(rules)
    }

    #[instrument(skip(self), fields(repo = "store", operation = "get_active_silences"))]
    async fn get_active_silences(&self) -> anyhow::Result<Vec<NotificationSilence>> {
        let rows = sqlx::query(
            "SELECT id, host_id, container_id, container_pattern, silenced_until, reason FROM notification_silences WHERE silenced_until >= $1 ORDER BY id",
        )
        .bind(Utc::now().timestamp_millis())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(NotificationSilence {
                    id: row.try_get("id")?,
                    host_id: row.try_get("host_id")?,
                    container_id: row.try_get("container_id")?,
                    container_pattern: row.try_get("container_pattern")?,
                    silenced_until: from_millis(row.try_get("silenced_until")?)?,
                    reason: row.try_get("reason")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(repo = "store", operation = "get_last_notification_time"))]
    async fn get_last_notification_time(
        &self,
        rule_id: i64,
        container_id: &str,
        host_id: i64,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT MAX(sent_at) AS last_sent FROM notification_log WHERE rule_id = $1 AND container_id = $2 AND host_id = $3 AND success = 1",
        )
        .bind(rule_id)
        .bind(container_id)
        .bind(host_id)
        .fetch_one(&self.pool)
        .await?;
        row.try_get::<Option<i64>, _>("last_sent")?
            .map(from_millis)
            .transpose()
    }

    #[instrument(skip(self, entry), fields(repo = "store", operation = "save_notification_log", event_type = %entry.event_type))]
    async fn save_notification_log(&self, entry: &NotificationLog) -> anyhow::Result<()> {
        let metadata = serde_json::to_string(&entry.metadata)?;
        sqlx::query(
            "INSERT INTO notification_log (rule_id, channel_id, event_type, container_id, container_name, host_id, host_name, message, metadata, sent_at, success, error, read) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(entry.rule_id)
        .bind(entry.channel_id)
        .bind(entry.event_type.as_str())
        .bind(&entry.container_id)
        .bind(&entry.container_name)
        .bind(entry.host_id)
        .bind(&entry.host_name)
        .bind(&entry.message)
        .bind(&metadata)
        .bind(entry.sent_at.timestamp_millis())
        .bind(entry.success)
        .bind(&entry.error)
        .bind(entry.read)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "store", operation = "get_notification_channel"))]
    async fn get_notification_channel(
        &self,
        id: i64,
    ) -> anyhow::Result<Option<NotificationChannel>> {
        let row = sqlx::query(
            "SELECT id, name, type, config, enabled FROM notification_channels WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(channel_from_row).transpose()
    }
}

fn from_millis(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {}", ms))
}

/// `now - ago` in epoch millis; clamps to the earliest instant when `ago` reaches past it.
fn millis_ago(ago: Duration) -> i64 {
    Utc::now()
        .checked_sub_signed(ago)
        .map_or(i64::MIN, |t| t.timestamp_millis())
}

fn to_u64(v: i64) -> u64 {
    v.max(0) as u64
}

fn host_from_row(row: &SqliteRow) -> anyhow::Result<Host> {
    Ok(Host {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        enabled: row.try_get("enabled")?,
        collect_stats: row.try_get("collect_stats")?,
    })
}

fn container_from_row(row: &SqliteRow) -> anyhow::Result<ContainerSnapshot> {
    let state: String = row.try_get("state")?;
    Ok(ContainerSnapshot {
        id: row.try_get("container_id")?,
        name: row.try_get("name")?,
        host_id: row.try_get("host_id")?,
        host_name: row.try_get("host_name")?,
        image: row.try_get("image")?,
        image_id: row.try_get("image_id")?,
        state: ContainerState::from_docker(&state),
        cpu_percent: row.try_get("cpu_percent")?,
        memory_usage: to_u64(row.try_get("memory_usage")?),
        memory_limit: to_u64(row.try_get("memory_limit")?),
        memory_percent: row.try_get("memory_percent")?,
        restart_count: row.try_get::<i64, _>("restart_count")?.clamp(0, u32::MAX as i64) as u32,
        scanned_at: from_millis(row.try_get("scanned_at")?)?,
    })
}

fn channel_from_row(row: &SqliteRow) -> anyhow::Result<NotificationChannel> {
    let config: String = row.try_get("config")?;
    Ok(NotificationChannel {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        channel_type: row.try_get("type")?,
        config: serde_json::from_str(&config)?,
        enabled: row.try_get("enabled")?,
    })
}

fn log_from_row(row: &SqliteRow) -> anyhow::Result<NotificationLog> {
    let event_type: String = row.try_get("event_type")?;
    let metadata: String = row.try_get("metadata")?;
    Ok(NotificationLog {
        id: row.try_get("id")?,
        rule_id: row.try_get("rule_id")?,
        channel_id: row.try_get("channel_id")?,
        event_type: EventType::from_str(&event_type)?,
        container_id: row.try_get("container_id")?,
        container_name: row.try_get("container_name")?,
        host_id: row.try_get("host_id")?,
        host_name: row.try_get("host_name")?,
        message: row.try_get("message")?,
        metadata: serde_json::from_str::<Metadata>(&metadata)?,
        sent_at: from_millis(row.try_get("sent_at")?)?,
        success: row.try_get("success")?,
        error: row.try_get("error")?,
        read: row.try_get("read")?,
    })
}

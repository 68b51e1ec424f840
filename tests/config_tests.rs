// Config loading and validation tests

use census::config::AppConfig;

const VALID_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[database]
path = "data/census.db"
max_pool_size = 10

[notifications]
max_per_hour = 50
batch_interval_secs = 300

[baseline]
window_hours = 24

[scanner]
host_name = "nas"
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.database.path, "data/census.db");
    assert_eq!(config.notifications.max_per_hour, 50);
    assert_eq!(config.notifications.batch_interval_secs, 300);
    assert_eq!(config.baseline.window_hours, 24);
    assert_eq!(config.scanner.host_name, "nas");
}

#[test]
fn test_config_defaults_apply() {
    let config = AppConfig::load_from_str(VALID_CONFIG).unwrap();
    assert_eq!(config.database.notification_retention_days, 7);
    assert_eq!(config.database.notification_keep_recent, 100);
    assert_eq!(config.database.cleanup_interval_secs, 3600);
    assert_eq!(config.database.snapshot_retention_days, 7);
    assert!(config.database.vacuum_schedule.is_none());
    assert_eq!(config.notifications.threshold_duration_secs, 120);
    assert_eq!(config.notifications.lifecycle_window_secs, 300);
    assert_eq!(config.notifications.anomaly_threshold, 0.25);
    assert_eq!(config.baseline.min_samples, 10);
    assert_eq!(config.baseline.update_interval_secs, 3600);
    assert!(config.scanner.enabled);
    assert_eq!(config.scanner.interval_secs, 300);
}

#[test]
fn test_config_sections_are_optional() {
    let minimal = r#"
[server]
port = 8081
host = "127.0.0.1"

[database]
path = "census.db"
max_pool_size = 2
"#;
    let config = AppConfig::load_from_str(minimal).unwrap();
    assert_eq!(config.notifications.max_per_hour, 100);
    assert_eq!(config.notifications.batch_interval_secs, 600);
    assert_eq!(config.baseline.window_hours, 48);
    assert_eq!(config.scanner.host_name, "local");
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 8081", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_validation_rejects_empty_db_path() {
    let bad = VALID_CONFIG.replace("path = \"data/census.db\"", "path = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("database.path"));
}

#[test]
fn test_config_validation_rejects_max_pool_size_zero() {
    let bad = VALID_CONFIG.replace("max_pool_size = 10", "max_pool_size = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("max_pool_size"));
}

#[test]
fn test_config_validation_rejects_zero_rate_limit() {
    let bad = VALID_CONFIG.replace("max_per_hour = 50", "max_per_hour = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("notifications.max_per_hour"));
}

#[test]
fn test_config_validation_rejects_zero_batch_interval() {
    let bad = VALID_CONFIG.replace("batch_interval_secs = 300", "batch_interval_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("batch_interval_secs"));
}

#[test]
fn test_config_validation_rejects_snapshot_retention_shorter_than_baseline_window() {
    let bad = VALID_CONFIG.replace(
        "max_pool_size = 10",
        "max_pool_size = 10\nsnapshot_retention_days = 1",
    );
    let bad = bad.replace("window_hours = 24", "window_hours = 48");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("snapshot_retention_days"));
}

#[test]
fn test_config_accepts_max_snapshot_retention() {
    let huge = VALID_CONFIG.replace(
        "max_pool_size = 10",
        "max_pool_size = 10\nsnapshot_retention_days = 4294967295",
    );
    let config = AppConfig::load_from_str(&huge).unwrap();
    assert_eq!(config.database.snapshot_retention_days, u32::MAX);
}

#[test]
fn test_config_vacuum_schedule_parses() {
    let with_cron = VALID_CONFIG.replace(
        "max_pool_size = 10",
        "max_pool_size = 10\nvacuum_schedule = \"0 0 3 * * *\"",
    );
    let config = AppConfig::load_from_str(&with_cron).unwrap();
    assert_eq!(config.database.vacuum_schedule.as_deref(), Some("0 0 3 * * *"));
}

#[test]
fn test_config_rejects_malformed_toml() {
    assert!(AppConfig::load_from_str("[server\nport = ").is_err());
}

use super::{
    Config, EngineConfig, InventoryConfig, LoggingConfig, NotificationConfig, PersistenceBackend,
    PersistenceConfig, PushoverConfig,
};

// Each subsection gets its own `Default` impl so `#[serde(default)]` on
// `Config`'s fields can fill in a missing TOML table section-by-section,
// not just an all-or-nothing file.

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler_tick_ms: 1000,
            concurrency_limit: 32,
            snmp_collector_interval_secs: 10,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::File,
            influxdb_url: "http://localhost:8086".to_string(),
            influxdb_org: "netsentry".to_string(),
            influxdb_bucket: "netsentry".to_string(),
            influxdb_token_env: "INFLUXDB_TOKEN".to_string(),
            fallback_file: "data/metrics.ndjson".into(),
            fallback_max_lines: 200,
        }
    }
}

impl Default for PushoverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token_env: "PUSHOVER_TOKEN".to_string(),
            user_key_env: "PUSHOVER_USER_KEY".to_string(),
            maintenance_mode: false,
            throttling_enabled: true,
            alert_threshold: 5,
            alert_window_secs: 60,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { cooldown_secs: 60 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            ndjson_log_path: "~/.netsentry/netsentry-events.ndjson".into(),
            debug_log_path: "~/.netsentry/netsentry-debug.log".into(),
            rotation_size_mb: 8,
            max_archives: 5,
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            path: "data/inventory.json".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine: EngineConfig::default(),
            persistence: PersistenceConfig::default(),
            pushover: PushoverConfig::default(),
            notifications: NotificationConfig::default(),
            logging: LoggingConfig::default(),
            inventory: InventoryConfig::default(),
        }
    }
}

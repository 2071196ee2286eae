mod defaults;

use crate::error::NetsentryError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub pushover: PushoverConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub scheduler_tick_ms: u64,
    pub concurrency_limit: usize,
    pub snmp_collector_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub backend: PersistenceBackend,
    pub influxdb_url: String,
    pub influxdb_org: String,
    pub influxdb_bucket: String,
    pub influxdb_token_env: String,
    pub fallback_file: PathBuf,
    pub fallback_max_lines: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    Influxdb,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushoverConfig {
    pub enabled: bool,
    pub token_env: String,
    pub user_key_env: String,
    pub maintenance_mode: bool,
    pub throttling_enabled: bool,
    pub alert_threshold: usize,
    pub alert_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub debug: bool,
    pub ndjson_log_path: PathBuf,
    pub debug_log_path: PathBuf,
    pub rotation_size_mb: u64,
    pub max_archives: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    pub path: PathBuf,
}

impl Config {
    /// Load configuration from a TOML file, falling back to built-in defaults
    /// if the file does not exist. A present-but-malformed file is an error
    /// (mirrors `ConfigParseError` leaving the previous configuration active
    /// on hot-reload, per the engine's error taxonomy).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, NetsentryError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| NetsentryError::ConfigReadError(format!("{}: {e}", path.display())))?;
        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Re-read persistence and logging sections without disturbing scheduler
    /// bookkeeping (§4.3's `reload_config`, §9's hot-reload note).
    pub fn reload<P: AsRef<Path>>(path: P) -> Result<Self, NetsentryError> {
        Self::load(path)
    }

    pub fn resolve_path(path: &Path) -> PathBuf {
        if let Ok(stripped) = path.strip_prefix("~") {
            let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
            home.join(stripped)
        } else {
            path.to_path_buf()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_default() {
        let config = Config::load("/nonexistent/path/netsentry.toml").unwrap();
        assert_eq!(config.engine.concurrency_limit, 32);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.engine.scheduler_tick_ms, config.engine.scheduler_tick_ms);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid toml {{{").unwrap();
        assert!(Config::load(&path).is_err());
    }
}

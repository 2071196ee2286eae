//! Persistence façade (§4.3): a time-series sink (primary, when enabled)
//! and a rotating append-only file sink (always-available fallback).
//! Grounded on `storage.py`'s `Storage` class: InfluxDB client when
//! `INFLUXDB_*` env vars resolve, NDJSON file otherwise, serialized under
//! one facade-wide lock for both writes and rotation.

mod file_sink;
mod influx_sink;

use crate::config::{PersistenceBackend, PersistenceConfig};
use crate::error::NetsentryError;
use crate::logging::EventLogger;
use async_trait::async_trait;
use chrono::Local;
use file_sink::FileSink;
use influx_sink::InfluxSink;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One reachability probe outcome, persisted with measurement `monitoring`
/// (§4.3, §6).
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringRecord {
    pub node: String,
    pub ip: String,
    pub group: String,
    pub protocol: String,
    pub status: String,
    pub success: bool,
    pub latency_ms: Option<f64>,
    pub packet_loss: Option<f64>,
    pub ping_responses: Option<serde_json::Value>,
}

/// One SNMP-derived metric sample, persisted with measurement
/// `snmp_metrics` (§4.3).
#[derive(Debug, Clone, Serialize)]
pub struct SnmpMetricRecord {
    pub node: String,
    pub ip: String,
    pub group: String,
    pub metric: String,
    pub unit: String,
    pub interface: Option<String>,
    pub metric_type: String,
    pub value: f64,
}

#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    async fn write_monitoring(&self, record: &MonitoringRecord) -> Result<(), NetsentryError>;
    async fn write_snmp_metric(&self, record: &SnmpMetricRecord) -> Result<(), NetsentryError>;
}

/// The façade the rest of the engine talks to. Picks InfluxDB as primary
/// when configured, otherwise writes straight to the file sink; the file
/// sink is always constructed so `reload_config` can fail over to it
/// without ever dropping a write.
pub struct PersistenceFacade {
    inner: RwLock<FacadeInner>,
    logger: Arc<EventLogger>,
}

struct FacadeInner {
    primary: Option<InfluxSink>,
    fallback: FileSink,
}

impl PersistenceFacade {
    pub fn new(config: &PersistenceConfig, logger: Arc<EventLogger>) -> Self {
        let fallback_path = crate::config::Config::resolve_path(&config.fallback_file);
        let fallback = FileSink::new(fallback_path, config.fallback_max_lines);

        let primary = if config.backend == PersistenceBackend::Influxdb {
            InfluxSink::from_config(config)
        } else {
            None
        };

        Self {
            inner: RwLock::new(FacadeInner { primary, fallback }),
            logger,
        }
    }

    /// Rebuilds the time-series client and re-reads the log path/retention
    /// without dropping in-flight writes (§4.3's `reload_config`).
    pub async fn reload_config(&self, config: &PersistenceConfig) {
        let fallback_path = crate::config::Config::resolve_path(&config.fallback_file);
        let fallback = FileSink::new(fallback_path, config.fallback_max_lines);
        let primary = if config.backend == PersistenceBackend::Influxdb {
            InfluxSink::from_config(config)
        } else {
            None
        };
        let mut inner = self.inner.write().await;
        inner.primary = primary;
        inner.fallback = fallback;
    }

    pub async fn write_monitoring(&self, record: MonitoringRecord) {
        let inner = self.inner.read().await;
        let result = if let Some(primary) = &inner.primary {
            primary.write_monitoring(&record).await
        } else {
            inner.fallback.write_monitoring(&record).await
        };
        if let Err(e) = result {
            self.logger.persistence_failure("monitoring", &e.to_string());
            // Engine never drops a reachability transition for a persistence
            // failure (§7): fall through to the always-available file sink.
            let _ = inner.fallback.write_monitoring(&record).await;
        }
    }

    pub async fn write_snmp_metric(&self, record: SnmpMetricRecord) {
        let inner = self.inner.read().await;
        let result = if let Some(primary) = &inner.primary {
            primary.write_snmp_metric(&record).await
        } else {
            inner.fallback.write_snmp_metric(&record).await
        };
        if let Err(e) = result {
            self.logger.persistence_failure("snmp_metrics", &e.to_string());
            let _ = inner.fallback.write_snmp_metric(&record).await;
        }
    }
}

pub(crate) fn local_timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

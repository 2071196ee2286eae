use super::{MonitoringRecord, SnmpMetricRecord, TimeSeriesSink};
use crate::config::PersistenceConfig;
use crate::error::NetsentryError;
use async_trait::async_trait;
use isahc::{AsyncReadResponseExt, HttpClient, Request};

/// Line-protocol writer against InfluxDB's `/api/v2/write` endpoint,
/// grounded on `storage.py`'s `InfluxDBClient`/`write_api` usage: tags and
/// fields per §4.3, one point per record, server-assigned timestamp.
pub struct InfluxSink {
    http_client: HttpClient,
    write_url: String,
    token: Option<String>,
}

impl InfluxSink {
    pub fn from_config(config: &PersistenceConfig) -> Option<Self> {
        let token = std::env::var(&config.influxdb_token_env).ok();
        let write_url = format!(
            "{}/api/v2/write?org={}&bucket={}&precision=ms",
            config.influxdb_url.trim_end_matches('/'),
            config.influxdb_org,
            config.influxdb_bucket,
        );
        Some(Self {
            http_client: HttpClient::new().ok()?,
            write_url,
            token,
        })
    }

    async fn write_line(&self, line: String) -> Result<(), NetsentryError> {
        let mut builder = Request::post(&self.write_url);
        if let Some(token) = &self.token {
            builder = builder.header("Authorization", format!("Token {token}"));
        }
        let request = builder
            .body(line)
            .map_err(|e| NetsentryError::PersistenceWriteFailure(e.to_string()))?;

        let mut response = self
            .http_client
            .send_async(request)
            .await
            .map_err(|e| NetsentryError::PersistenceWriteFailure(e.to_string()))?;
        let _ = response.consume().await;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NetsentryError::PersistenceWriteFailure(format!(
                "influxdb write returned status {}",
                response.status()
            )))
        }
    }
}

fn escape_tag(value: &str) -> String {
    value.replace(' ', "\\ ").replace(',', "\\,").replace('=', "\\=")
}

#[async_trait]
impl TimeSeriesSink for InfluxSink {
    async fn write_monitoring(&self, record: &MonitoringRecord) -> Result<(), NetsentryError> {
        let status_code = if record.status == "UP" { 1 } else { 0 };
        let responses = record
            .ping_responses
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        let line = format!(
            "monitoring,node={},ip={},group={},status={},protocol={} latency={},packet_loss={},status_code={}i,success={}i,responses=\"{}\"",
            escape_tag(&record.node),
            escape_tag(&record.ip),
            escape_tag(&record.group),
            escape_tag(&record.status),
            escape_tag(&record.protocol),
            record.latency_ms.unwrap_or(0.0),
            record.packet_loss.unwrap_or(0.0),
            status_code,
            record.success as i32,
            responses.replace('"', "'"),
        );
        self.write_line(line).await
    }

    async fn write_snmp_metric(&self, record: &SnmpMetricRecord) -> Result<(), NetsentryError> {
        let line = format!(
            "snmp_metrics,node={},ip={},group={},metric={},unit={},interface={},type={} value={}",
            escape_tag(&record.node),
            escape_tag(&record.ip),
            escape_tag(&record.group),
            escape_tag(&record.metric),
            escape_tag(&record.unit),
            escape_tag(record.interface.as_deref().unwrap_or("none")),
            escape_tag(&record.metric_type),
            record.value,
        );
        self.write_line(line).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_tag_handles_reserved_characters() {
        assert_eq!(escape_tag("a b"), "a\\ b");
        assert_eq!(escape_tag("a,b"), "a\\,b");
        assert_eq!(escape_tag("a=b"), "a\\=b");
    }
}

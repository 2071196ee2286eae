use super::{local_timestamp, MonitoringRecord, SnmpMetricRecord, TimeSeriesSink};
use crate::error::NetsentryError;
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Newline-delimited JSON fallback sink (§4.3, §6's file-log format),
/// grounded on `storage.py`'s `_rotate_log(max_lines=200)`: keep only the
/// last `max_lines` entries, rewriting the whole file under one lock.
pub struct FileSink {
    path: PathBuf,
    max_lines: usize,
    lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: PathBuf, max_lines: usize) -> Self {
        Self {
            path,
            max_lines,
            lock: Mutex::new(()),
        }
    }

    async fn append_line(&self, line: String) -> Result<(), NetsentryError> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let max_lines = self.max_lines;
        tokio::task::spawn_blocking(move || append_and_rotate(&path, &line, max_lines))
            .await
            .map_err(|e| NetsentryError::PersistenceWriteFailure(e.to_string()))?
    }
}

fn append_and_rotate(path: &std::path::Path, line: &str, max_lines: usize) -> Result<(), NetsentryError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| NetsentryError::PersistenceWriteFailure(e.to_string()))?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| NetsentryError::PersistenceWriteFailure(e.to_string()))?;
    writeln!(file, "{line}").map_err(|e| NetsentryError::PersistenceWriteFailure(e.to_string()))?;
    drop(file);

    let contents = std::fs::read_to_string(path)
        .map_err(|e| NetsentryError::PersistenceWriteFailure(e.to_string()))?;
    let total_lines = contents.lines().count();
    if total_lines > max_lines {
        let trimmed: Vec<&str> = contents.lines().skip(total_lines - max_lines).collect();
        let mut rewritten = trimmed.join("\n");
        rewritten.push('\n');
        std::fs::write(path, rewritten)
            .map_err(|e| NetsentryError::PersistenceWriteFailure(e.to_string()))?;
    }
    Ok(())
}

#[async_trait]
impl TimeSeriesSink for FileSink {
    async fn write_monitoring(&self, record: &MonitoringRecord) -> Result<(), NetsentryError> {
        let entry = serde_json::json!({
            "timestamp": local_timestamp(),
            "node": record.node,
            "ip": record.ip,
            "group": record.group,
            "protocol": record.protocol,
            "latency": record.latency_ms,
            "packet_loss": record.packet_loss,
            "status": record.status,
            "success": record.success,
            "ping_responses": record.ping_responses,
        });
        self.append_line(entry.to_string()).await
    }

    async fn write_snmp_metric(&self, record: &SnmpMetricRecord) -> Result<(), NetsentryError> {
        let entry = serde_json::json!({
            "timestamp": local_timestamp(),
            "node": record.node,
            "ip": record.ip,
            "group": record.group,
            "metric": record.metric,
            "unit": record.unit,
            "interface": record.interface,
            "type": record.metric_type,
            "value": record.value,
        });
        self.append_line(entry.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rotation_keeps_only_last_max_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("log.ndjson"), 3);
        for i in 0..5 {
            sink.write_monitoring(&MonitoringRecord {
                node: format!("n{i}"),
                ip: "10.0.0.1".into(),
                group: "g".into(),
                protocol: "icmp".into(),
                status: "UP".into(),
                success: true,
                latency_ms: None,
                packet_loss: None,
                ping_responses: None,
            })
            .await
            .unwrap();
        }
        let contents = std::fs::read_to_string(dir.path().join("log.ndjson")).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.contains("\"n4\""));
        assert!(!contents.contains("\"n0\""));
    }
}

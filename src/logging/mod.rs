//! Structured, rotating logging for the engine. Two independent sinks are
//! maintained: an always-on NDJSON operational log and a `NETSENTRY_DEBUG`
//! gated free-text trace log. Both rotate by size, keep a bounded number of
//! gzip archives, and redact obvious secrets before a line is written.
//!
//! Size-triggered, file-lock-guarded rotation with redaction applied
//! before a line ever reaches disk, generalized from HTTP/credential
//! events to probe/state/alert events.

mod rotation;

use crate::config::LoggingConfig;
use crate::error::parse_env_bool;
use chrono::Local;
use regex::Regex;
use rotation::RotatingLogger;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub struct EventLogger {
    enabled: bool,
    debug_logger: Option<Arc<Mutex<RotatingLogger>>>,
    ndjson_logger: Arc<Mutex<RotatingLogger>>,
    run_id: String,
    redaction_patterns: Vec<Regex>,
}

impl EventLogger {
    pub fn from_config(config: &LoggingConfig) -> Self {
        let run_id = Uuid::new_v4().to_string()[..8].to_string();

        let debug_logger = if config.debug || parse_env_bool("NETSENTRY_DEBUG") {
            let path = crate::config::Config::resolve_path(&config.debug_log_path);
            Some(Arc::new(Mutex::new(RotatingLogger::new(
                path,
                config.rotation_size_mb,
                config.max_archives,
            ))))
        } else {
            None
        };

        let ndjson_path = crate::config::Config::resolve_path(&config.ndjson_log_path);
        let ndjson_logger = Arc::new(Mutex::new(RotatingLogger::new(
            ndjson_path,
            config.rotation_size_mb,
            config.max_archives,
        )));

        Self {
            enabled: config.debug || parse_env_bool("NETSENTRY_DEBUG"),
            debug_logger,
            ndjson_logger,
            run_id,
            redaction_patterns: Self::compile_redaction_patterns(),
        }
    }

    fn compile_redaction_patterns() -> Vec<Regex> {
        let patterns = [
            r"(?i)authorization[:\s]+[^\s\n]+",
            r"(?i)bearer[:\s]+[^\s\n]+",
            r"(?i)token[:\s]+[^\s\n]+",
            r"(?i)community[:\s]+[^\s\n]+",
            r"(?i)user[_-]?key[:\s]+[^\s\n]+",
        ];
        patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
    }

    fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        for re in &self.redaction_patterns {
            redacted = re.replace_all(&redacted, "[REDACTED]").to_string();
        }
        redacted
    }

    fn debug_line(&self, component: &str, event: &str, message: &str, fields: &HashMap<String, serde_json::Value>) {
        if !self.enabled {
            return;
        }
        let Some(logger) = &self.debug_logger else {
            return;
        };
        let timestamp = Local::now().to_rfc3339();
        let redacted = self.redact(message);
        let mut line = format!(
            "{timestamp} [{component}] \"{event}\",\"{redacted}\",\"{}\"",
            self.run_id
        );
        if !fields.is_empty() {
            let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
            line.push_str(&format!(" [{}]", parts.join(" ")));
        }
        if let Ok(logger) = logger.lock() {
            let _ = logger.write_with_rotation(&line);
        }
    }

    /// Always-on structured event, redacted and appended to the NDJSON log.
    pub fn record(&self, mut event: serde_json::Value) {
        if let Some(message) = event.get("message").and_then(|m| m.as_str()) {
            let redacted = self.redact(message);
            event["message"] = serde_json::Value::String(redacted);
        }
        if let Ok(logger) = self.ndjson_logger.lock() {
            if let Ok(line) = serde_json::to_string(&event) {
                let _ = logger.write_with_rotation(&line);
            }
        }
    }

    pub fn debug(&self, component: &str, event: &str, message: &str) {
        self.debug_line(component, event, message, &HashMap::new());
    }

    pub fn probe_start(&self, node_id: &str, protocol: &str) {
        self.debug("Scheduler", "probe_start", &format!("{node_id} via {protocol}"));
        self.record(event_json("probe_start", node_id, protocol, None));
    }

    pub fn probe_end(&self, node_id: &str, protocol: &str, success: bool, latency_ms: Option<f64>) {
        self.debug(
            "Scheduler",
            "probe_end",
            &format!("{node_id} via {protocol}: success={success}"),
        );
        self.record(event_json("probe_end", node_id, protocol, latency_ms).tap_success(success));
    }

    pub fn state_transition(&self, node_id: &str, from: &str, to: &str) {
        self.debug(
            "StateMachine",
            "transition",
            &format!("{node_id}: {from} -> {to}"),
        );
        self.record(serde_json::json!({
            "event": "state_transition",
            "node_id": node_id,
            "from": from,
            "to": to,
            "timestamp": Local::now().to_rfc3339(),
        }));
    }

    pub fn alert_dispatch(&self, binding_id: &str, level: &str, suppressed: bool) {
        self.debug(
            "MetricProcessor",
            "alert_dispatch",
            &format!("{binding_id}: {level} suppressed={suppressed}"),
        );
        self.record(serde_json::json!({
            "event": "alert_dispatch",
            "binding_id": binding_id,
            "level": level,
            "suppressed": suppressed,
            "timestamp": Local::now().to_rfc3339(),
        }));
    }

    pub fn persistence_failure(&self, sink: &str, message: &str) {
        let redacted = self.redact(message);
        self.debug("Persistence", "write_failure", &redacted);
        self.record(serde_json::json!({
            "event": "persistence_write_failure",
            "sink": sink,
            "message": redacted,
            "timestamp": Local::now().to_rfc3339(),
        }));
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.enabled
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

fn event_json(event: &str, node_id: &str, protocol: &str, latency_ms: Option<f64>) -> serde_json::Value {
    serde_json::json!({
        "event": event,
        "node_id": node_id,
        "protocol": protocol,
        "latency_ms": latency_ms,
        "timestamp": Local::now().to_rfc3339(),
    })
}

trait TapSuccess {
    fn tap_success(self, success: bool) -> Self;
}

impl TapSuccess for serde_json::Value {
    fn tap_success(mut self, success: bool) -> Self {
        if let Some(obj) = self.as_object_mut() {
            obj.insert("success".to_string(), serde_json::Value::Bool(success));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;

    fn test_logging_config(dir: &std::path::Path) -> LoggingConfig {
        LoggingConfig {
            debug: true,
            ndjson_log_path: dir.join("events.ndjson"),
            debug_log_path: dir.join("debug.log"),
            rotation_size_mb: 8,
            max_archives: 5,
        }
    }

    #[test]
    fn redacts_tokens_in_debug_output() {
        let dir = tempfile::tempdir().unwrap();
        let logger = EventLogger::from_config(&test_logging_config(dir.path()));
        logger.debug("Test", "event", "token: sk-abc123-very-secret");
        let contents = std::fs::read_to_string(dir.path().join("debug.log")).unwrap();
        assert!(contents.contains("[REDACTED]"));
        assert!(!contents.contains("sk-abc123-very-secret"));
    }

    #[test]
    fn ndjson_log_is_always_on_even_without_debug() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_logging_config(dir.path());
        config.debug = false;
        let logger = EventLogger::from_config(&config);
        logger.probe_start("n1", "icmp");
        let contents = std::fs::read_to_string(dir.path().join("events.ndjson")).unwrap();
        assert!(contents.contains("probe_start"));
    }
}

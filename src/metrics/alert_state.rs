use crate::error::NetsentryError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Warning,
    Critical,
}

/// `AlertState` per NodeMetric (§3), persisted to a single JSON object
/// mapping `node_metric_id -> "WARNING" | "CRITICAL"` (§6). Grounded on
/// `metrics_processor.py`'s `_load_alert_states`/`_save_alert_states`:
/// reload-before-decide, save-after-decide, multi-writer safe via the
/// caller's lock.
pub struct AlertStateStore {
    path: PathBuf,
}

impl AlertStateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> HashMap<String, AlertLevel> {
        Self::load_from(&self.path)
    }

    fn load_from(path: &Path) -> HashMap<String, AlertLevel> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    pub fn save(&self, states: &HashMap<String, AlertLevel>) -> Result<(), NetsentryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string(states)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// L2: serializing and reloading `AlertState` yields an equal map.
    #[test]
    fn l2_json_round_trip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertStateStore::new(dir.path().join("alert_states.json"));
        let mut states = HashMap::new();
        states.insert("binding-1".to_string(), AlertLevel::Warning);
        states.insert("binding-2".to_string(), AlertLevel::Critical);
        store.save(&states).unwrap();
        let reloaded = store.load();
        assert_eq!(reloaded, states);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertStateStore::new(dir.path().join("missing.json"));
        assert!(store.load().is_empty());
    }
}

//! Read-only inventory entities (§3) and the snapshot interface the engine
//! pulls once per tick (§6, "Inventory interface"). Ownership is expressed
//! via identifier lookups into flat tables rather than owning pointers, so
//! a snapshot is trivially `Clone` and cheap to hand to concurrent tasks
//! (§9, "Cyclic inventory references").

use crate::error::NetsentryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub type GroupId = String;
pub type NodeId = String;
pub type MetricDefinitionId = String;
pub type NodeMetricId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub interval_secs: u64,
    pub packet_count: u32,
    pub max_retries: u32,
    pub protocol_mask: ProtocolMask,
    pub snmp_community: String,
    pub snmp_port: u16,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMask {
    pub icmp: bool,
    pub snmp: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub ip: std::net::Ipv4Addr,
    pub group_id: Option<GroupId>,
    pub interval_secs: Option<u64>,
    pub packet_count: Option<u32>,
    pub max_retries: Option<u32>,
    pub protocol_mask: Option<ProtocolMask>,
    pub snmp_community: Option<String>,
    pub snmp_port: Option<u16>,
    pub notification_priority: Option<i8>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSource {
    Snmp,
    Icmp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: MetricDefinitionId,
    pub name: String,
    pub oid_template: String,
    pub kind: MetricKind,
    pub unit: String,
    pub source: MetricSource,
    pub requires_index: bool,
    pub category: Option<String>,
    pub device_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Gt,
    Lt,
}

impl Default for Comparator {
    fn default() -> Self {
        Comparator::Gt
    }
}

impl Comparator {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Gt => "\u{2265}",
            Comparator::Lt => "\u{2264}",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetric {
    pub id: NodeMetricId,
    pub node_id: NodeId,
    pub metric_definition_id: MetricDefinitionId,
    pub interface_index: Option<u32>,
    pub interface_name: Option<String>,
    pub collection_interval_secs: u64,
    pub enabled: bool,
    pub warning_threshold: Option<f64>,
    pub critical_threshold: Option<f64>,
    #[serde(default)]
    pub alert_condition: Comparator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInterface {
    pub id: String,
    pub node_id: NodeId,
    pub if_index: u32,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub if_type: Option<String>,
    pub mac_address: Option<String>,
    pub admin_status: Option<String>,
    pub oper_status: Option<String>,
    pub monitor_enabled: bool,
}

/// A consistent read-only view of the inventory for one tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub groups: HashMap<GroupId, Group>,
    pub nodes: HashMap<NodeId, Node>,
    pub metric_definitions: HashMap<MetricDefinitionId, MetricDefinition>,
    pub node_metrics: HashMap<NodeMetricId, NodeMetric>,
    pub interfaces: Vec<NodeInterface>,
}

impl InventorySnapshot {
    pub fn group_for(&self, node: &Node) -> Option<&Group> {
        node.group_id.as_ref().and_then(|id| self.groups.get(id))
    }

    /// Effective heartbeat interval before the PENDING-state acceleration
    /// of §4.1; falls back to the group default, then the engine default.
    pub fn effective_interval_secs(&self, node: &Node) -> u64 {
        node.interval_secs
            .or_else(|| self.group_for(node).map(|g| g.interval_secs))
            .unwrap_or(60)
    }

    pub fn effective_packet_count(&self, node: &Node) -> u32 {
        node.packet_count
            .or_else(|| self.group_for(node).map(|g| g.packet_count))
            .unwrap_or(1)
    }

    pub fn effective_max_retries(&self, node: &Node) -> u32 {
        node.max_retries
            .or_else(|| self.group_for(node).map(|g| g.max_retries))
            .unwrap_or(4)
    }

    pub fn effective_protocol_mask(&self, node: &Node) -> ProtocolMask {
        node.protocol_mask
            .or_else(|| self.group_for(node).map(|g| g.protocol_mask))
            .unwrap_or(ProtocolMask {
                icmp: true,
                snmp: false,
            })
    }

    pub fn effective_snmp_community(&self, node: &Node) -> String {
        node.snmp_community
            .clone()
            .or_else(|| self.group_for(node).map(|g| g.snmp_community.clone()))
            .unwrap_or_else(|| "public".to_string())
    }

    pub fn effective_snmp_port(&self, node: &Node) -> u16 {
        node.snmp_port
            .or_else(|| self.group_for(node).map(|g| g.snmp_port))
            .unwrap_or(161)
    }

    /// A node is orphaned if it references a group id that isn't present
    /// in this snapshot (§4.7's tick algorithm, step 1: "If orphaned … skip").
    pub fn is_orphaned(&self, node: &Node) -> bool {
        match &node.group_id {
            None => true,
            Some(id) => !self.groups.contains_key(id),
        }
    }

    pub fn is_node_disabled(&self, node: &Node) -> bool {
        !node.enabled || self.group_for(node).map(|g| !g.enabled).unwrap_or(false)
    }

    pub fn node_metrics_for(&self, node_id: &str) -> impl Iterator<Item = &NodeMetric> {
        self.node_metrics.values().filter(move |m| m.node_id == node_id)
    }
}

/// Provider of inventory snapshots. The engine calls this once per tick;
/// the provider owns its own caching (§6).
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn snapshot(&self) -> Result<InventorySnapshot, NetsentryError>;
}

/// JSON-file-backed inventory store: a whole-file snapshot re-read each
/// tick, matching the "declarative config-file synchronizer" collaborator
/// named out of scope in §1; this is the read side of that interface,
/// not the synchronizer itself.
pub struct FileInventoryStore {
    path: PathBuf,
}

impl FileInventoryStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl InventoryStore for FileInventoryStore {
    async fn snapshot(&self) -> Result<InventorySnapshot, NetsentryError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_snapshot_sync(&path))
            .await
            .map_err(|e| NetsentryError::InventoryUnavailable(e.to_string()))?
    }
}

fn read_snapshot_sync(path: &Path) -> Result<InventorySnapshot, NetsentryError> {
    if !path.exists() {
        return Ok(InventorySnapshot::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| NetsentryError::InventoryUnavailable(format!("{}: {e}", path.display())))?;
    let snapshot: InventorySnapshot = serde_json::from_str(&raw)
        .map_err(|e| NetsentryError::InventoryUnavailable(e.to_string()))?;
    Ok(snapshot)
}

/// In-memory inventory for tests: returns a fixed snapshot supplied at
/// construction, no filesystem involved.
#[cfg(any(test, feature = "test-support"))]
pub struct InMemoryInventoryStore {
    snapshot: InventorySnapshot,
}

#[cfg(any(test, feature = "test-support"))]
impl InMemoryInventoryStore {
    pub fn new(snapshot: InventorySnapshot) -> Self {
        Self { snapshot }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn snapshot(&self) -> Result<InventorySnapshot, NetsentryError> {
        Ok(self.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: &str, enabled: bool) -> Group {
        Group {
            id: id.to_string(),
            name: id.to_string(),
            interval_secs: 60,
            packet_count: 1,
            max_retries: 4,
            protocol_mask: ProtocolMask {
                icmp: true,
                snmp: false,
            },
            snmp_community: "public".to_string(),
            snmp_port: 161,
            enabled,
        }
    }

    fn node(id: &str, group_id: Option<&str>) -> Node {
        Node {
            id: id.to_string(),
            name: id.to_string(),
            ip: "10.0.0.1".parse().unwrap(),
            group_id: group_id.map(str::to_string),
            interval_secs: None,
            packet_count: None,
            max_retries: None,
            protocol_mask: None,
            snmp_community: None,
            snmp_port: None,
            notification_priority: None,
            enabled: true,
        }
    }

    #[test]
    fn node_without_group_is_orphaned() {
        let snapshot = InventorySnapshot::default();
        let n = node("n1", None);
        assert!(snapshot.is_orphaned(&n));
    }

    #[test]
    fn node_inherits_group_defaults() {
        let mut snapshot = InventorySnapshot::default();
        snapshot.groups.insert("g1".to_string(), group("g1", true));
        let n = node("n1", Some("g1"));
        assert_eq!(snapshot.effective_interval_secs(&n), 60);
        assert_eq!(snapshot.effective_max_retries(&n), 4);
        assert!(!snapshot.is_orphaned(&n));
    }

    #[test]
    fn disabled_group_disables_node() {
        let mut snapshot = InventorySnapshot::default();
        snapshot.groups.insert("g1".to_string(), group("g1", false));
        let n = node("n1", Some("g1"));
        assert!(snapshot.is_node_disabled(&n));
    }

    #[test]
    fn per_node_override_wins_over_group() {
        let mut snapshot = InventorySnapshot::default();
        snapshot.groups.insert("g1".to_string(), group("g1", true));
        let mut n = node("n1", Some("g1"));
        n.interval_secs = Some(15);
        assert_eq!(snapshot.effective_interval_secs(&n), 15);
    }
}

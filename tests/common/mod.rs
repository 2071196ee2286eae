//! Shared fixtures for netsentry's integration tests.

use netsentry::inventory::{
    Group, InventorySnapshot, MetricDefinition, MetricKind, MetricSource, Node, NodeMetric,
    ProtocolMask,
};
use std::net::Ipv4Addr;

pub fn icmp_only_group(id: &str) -> Group {
    Group {
        id: id.to_string(),
        name: id.to_string(),
        // Zero so `Scheduler::due` never blocks a second `tick_once()` call
        // issued moments after the first in these synchronous tests.
        interval_secs: 0,
        packet_count: 1,
        max_retries: 1,
        protocol_mask: ProtocolMask { icmp: true, snmp: false },
        snmp_community: "public".to_string(),
        snmp_port: 161,
        enabled: true,
    }
}

pub fn node_in_group(id: &str, ip: [u8; 4], group_id: &str) -> Node {
    Node {
        id: id.to_string(),
        name: id.to_string(),
        ip: Ipv4Addr::from(ip),
        group_id: Some(group_id.to_string()),
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

pub fn snmp_counter_definition(id: &str) -> MetricDefinition {
    MetricDefinition {
        id: id.to_string(),
        name: "ifInOctets".to_string(),
        oid_template: "1.3.6.1.2.1.2.2.1.10.{index}".to_string(),
        kind: MetricKind::Counter,
        unit: "bytes".to_string(),
        source: MetricSource::Snmp,
        requires_index: true,
        category: Some("interface".to_string()),
        device_type: None,
    }
}

pub fn node_metric(id: &str, node_id: &str, definition_id: &str) -> NodeMetric {
    NodeMetric {
        id: id.to_string(),
        node_id: node_id.to_string(),
        metric_definition_id: definition_id.to_string(),
        interface_index: Some(1),
        interface_name: Some("eth0".to_string()),
        collection_interval_secs: 10,
        enabled: true,
        warning_threshold: None,
        critical_threshold: None,
        alert_condition: Default::default(),
    }
}

pub fn single_node_snapshot(node: Node, group: Group) -> InventorySnapshot {
    let mut snapshot = InventorySnapshot::default();
    snapshot.groups.insert(group.id.clone(), group);
    snapshot.nodes.insert(node.id.clone(), node);
    snapshot
}

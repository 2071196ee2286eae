use crate::common::{
    icmp_only_group, node_in_group, node_metric, single_node_snapshot, snmp_counter_definition,
};
use netsentry::config::Config;
use netsentry::inventory::{InMemoryInventoryStore, InventoryStore, ProtocolMask};
use netsentry::logging::EventLogger;
use netsentry::manager::MonitorManager;
use netsentry::metrics::{AlertStateStore, MetricProcessor};
use netsentry::notifications::MockNotificationSink;
use netsentry::persistence::PersistenceFacade;
use netsentry::probes::{FakeIcmpDriver, FakeSnmpDriver};
use std::sync::Arc;

/// A full pass through the SNMP metric-collector sub-loop: the gauge-like
/// first reading establishes a counter baseline with no emitted sample,
/// matching the processor's own "first sample yields no rate" rule.
#[tokio::test]
async fn snmp_collector_persists_a_metric_sample_on_the_second_pass() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.persistence.fallback_file = dir.join("metrics.ndjson");
    config.logging.ndjson_log_path = dir.join("events.ndjson");
    config.logging.debug_log_path = dir.join("debug.log");

    let mut group = icmp_only_group("g1");
    group.protocol_mask = ProtocolMask { icmp: false, snmp: true };
    let node = node_in_group("n1", [10, 0, 0, 2], "g1");
    let definition = snmp_counter_definition("def1");
    let binding = node_metric("nm1", "n1", "def1");

    let mut snapshot = single_node_snapshot(node, group);
    snapshot.metric_definitions.insert(definition.id.clone(), definition);
    snapshot.node_metrics.insert(binding.id.clone(), binding);
    let inventory: Arc<dyn InventoryStore> = Arc::new(InMemoryInventoryStore::new(snapshot));

    let logger = Arc::new(EventLogger::from_config(&config.logging));
    let persistence = Arc::new(PersistenceFacade::new(&config.persistence, Arc::clone(&logger)));
    let mock = Arc::new(MockNotificationSink::new());
    let metrics = Arc::new(MetricProcessor::new(
        AlertStateStore::new(dir.path().join("alert_states.json")),
        mock.clone(),
        Arc::clone(&logger),
    ));

    let icmp = Arc::new(FakeIcmpDriver { success: true, latency_ms: Some(1.0) });
    let snmp = Arc::new(FakeSnmpDriver { success: true, value: "1000".to_string() });

    let manager = Arc::new(MonitorManager::new(
        config,
        inventory,
        icmp,
        snmp,
        persistence,
        metrics,
        mock,
        logger,
    ));

    manager.collect_snmp_metrics_once().await;
    assert!(!dir.path().join("metrics.ndjson").exists());

    manager.collect_snmp_metrics_once().await;
    let contents = std::fs::read_to_string(dir.path().join("metrics.ndjson")).unwrap();
    assert!(contents.contains("ifInOctets"));
    assert!(contents.contains("\"unit\":\"bps\""));
}

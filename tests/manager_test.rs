use crate::common::{icmp_only_group, node_in_group, node_metric, single_node_snapshot, snmp_counter_definition};
use netsentry::config::Config;
use netsentry::inventory::{InMemoryInventoryStore, InventorySnapshot, InventoryStore};
use netsentry::logging::EventLogger;
use netsentry::manager::MonitorManager;
use netsentry::metrics::{AlertStateStore, MetricProcessor, ProcessedSample};
use netsentry::notifications::MockNotificationSink;
use netsentry::persistence::PersistenceFacade;
use netsentry::probes::{FakeIcmpDriver, FakeSnmpDriver};
use netsentry::state_machine::ReachabilityStatus;
use std::sync::Arc;

fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.persistence.fallback_file = dir.join("metrics.ndjson");
    config.logging.ndjson_log_path = dir.join("events.ndjson");
    config.logging.debug_log_path = dir.join("debug.log");
    config
}

fn build_manager(
    dir: &std::path::Path,
    icmp_success: bool,
    mock: Arc<MockNotificationSink>,
) -> (Arc<MonitorManager>, Arc<dyn InventoryStore>) {
    let config = test_config(dir);
    let group = icmp_only_group("g1");
    let node = node_in_group("n1", [10, 0, 0, 1], "g1");
    let snapshot = single_node_snapshot(node, group);
    let inventory: Arc<dyn InventoryStore> = Arc::new(InMemoryInventoryStore::new(snapshot));

    let logger = Arc::new(EventLogger::from_config(&config.logging));
    let persistence = Arc::new(PersistenceFacade::new(&config.persistence, Arc::clone(&logger)));
    let metrics = Arc::new(MetricProcessor::new(
        AlertStateStore::new(dir.join("alert_states.json")),
        mock.clone(),
        Arc::clone(&logger),
    ));

    let icmp = Arc::new(FakeIcmpDriver {
        success: icmp_success,
        latency_ms: Some(1.5),
    });
    let snmp = Arc::new(FakeSnmpDriver {
        success: true,
        value: "1000".to_string(),
    });

    let manager = Arc::new(MonitorManager::new(
        config,
        Arc::clone(&inventory),
        icmp,
        snmp,
        persistence,
        metrics,
        mock,
        logger,
    ));
    (manager, inventory)
}

#[tokio::test]
async fn successful_probe_keeps_node_up_and_persists_a_record() {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockNotificationSink::new());
    let (manager, _inventory) = build_manager(dir.path(), true, mock.clone());

    manager.tick_once().await;

    let status = manager.status().await;
    assert_eq!(status.get("n1"), Some(&ReachabilityStatus::Up));
    assert_eq!(mock.count(), 0);

    let contents = std::fs::read_to_string(dir.path().join("metrics.ndjson")).unwrap();
    assert!(contents.contains("\"node\":\"n1\""));
}

/// S1-equivalent at the manager level: enough consecutive failures push a
/// node from UP through PENDING into DOWN, and exactly one DOWN
/// notification fires.
#[tokio::test]
async fn repeated_failures_drive_node_down_and_notify_once() {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockNotificationSink::new());
    let (manager, _inventory) = build_manager(dir.path(), false, mock.clone());

    // max_retries = 1 on the fixture group: UP -> PENDING (1st failure),
    // PENDING -> DOWN (2nd failure, count=2 > max_retries=1).
    manager.tick_once().await;
    assert_eq!(manager.status().await.get("n1"), Some(&ReachabilityStatus::Pending));
    manager.tick_once().await;
    assert_eq!(manager.status().await.get("n1"), Some(&ReachabilityStatus::Down));

    assert_eq!(mock.count(), 1);
    let sent = mock.sent.lock().unwrap();
    assert!(sent[0].0.contains("DOWN"));
}

#[tokio::test]
async fn paused_node_is_skipped_by_tick() {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockNotificationSink::new());
    let (manager, _inventory) = build_manager(dir.path(), false, mock.clone());

    manager.mark_paused("n1").await;
    manager.tick_once().await;

    assert_eq!(manager.status().await.get("n1"), Some(&ReachabilityStatus::Paused));
    assert_eq!(mock.count(), 0);
}

/// S6: a node disabled (out-of-band, e.g. via inventory edit rather than
/// the `mark_paused` RPC) while it holds an active metric alert gets
/// PAUSED by the next tick, with that alert cleared, not just skipped.
#[tokio::test]
async fn disabled_node_is_paused_with_cleared_alerts_and_a_paused_record() {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockNotificationSink::new());
    let config = test_config(dir.path());

    let group = icmp_only_group("g1");
    let mut node = node_in_group("n1", [10, 0, 0, 1], "g1");
    node.enabled = false;

    let definition = snmp_counter_definition("def-1");
    let binding = node_metric("nm-1", "n1", "def-1");

    let mut snapshot = InventorySnapshot::default();
    snapshot.groups.insert(group.id.clone(), group);
    snapshot.nodes.insert(node.id.clone(), node.clone());
    snapshot.metric_definitions.insert(definition.id.clone(), definition);
    snapshot.node_metrics.insert(binding.id.clone(), binding.clone());
    let inventory: Arc<dyn InventoryStore> = Arc::new(InMemoryInventoryStore::new(snapshot));

    let logger = Arc::new(EventLogger::from_config(&config.logging));
    let persistence = Arc::new(PersistenceFacade::new(&config.persistence, Arc::clone(&logger)));
    let metrics = Arc::new(MetricProcessor::new(
        AlertStateStore::new(dir.path().join("alert_states.json")),
        mock.clone(),
        Arc::clone(&logger),
    ));

    // Seed an active alert for the node's binding before it's ever
    // observed as paused by a tick.
    let mut alerting_binding = binding.clone();
    alerting_binding.critical_threshold = Some(95.0);
    metrics
        .evaluate(
            &ProcessedSample { node_metric_id: binding.id.clone(), value: 99.0, unit: "percent".to_string() },
            &alerting_binding,
            &node,
            "cpu",
        )
        .await;
    assert_eq!(metrics.worst_level_for(&[binding.id.clone()]).await, Some(netsentry::metrics::AlertLevel::Critical));

    let icmp = Arc::new(FakeIcmpDriver { success: true, latency_ms: Some(1.0) });
    let snmp = Arc::new(FakeSnmpDriver { success: true, value: "1000".to_string() });
    let manager = Arc::new(MonitorManager::new(
        config,
        Arc::clone(&inventory),
        icmp,
        snmp,
        persistence,
        Arc::clone(&metrics),
        mock.clone(),
        logger,
    ));

    manager.tick_once().await;

    assert_eq!(manager.status().await.get("n1"), Some(&ReachabilityStatus::Paused));
    assert_eq!(metrics.worst_level_for(&[binding.id.clone()]).await, None);
    assert_eq!(mock.count(), 0);

    let contents = std::fs::read_to_string(dir.path().join("metrics.ndjson")).unwrap();
    assert!(contents.contains("\"status\":\"PAUSED\""));
}

#[tokio::test]
async fn unpause_schedules_an_immediate_recheck() {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockNotificationSink::new());
    let (manager, _inventory) = build_manager(dir.path(), true, mock.clone());

    manager.mark_paused("n1").await;
    manager.mark_unpaused("n1").await;
    manager.tick_once().await;

    assert_eq!(manager.status().await.get("n1"), Some(&ReachabilityStatus::Up));
}

//! The Monitor Manager (§4.7): the engine's top-level driver loop. Ties
//! the inventory, scheduler, probe drivers, reachability state machine,
//! persistence façade, and metric processor together, with storm
//! throttling and maintenance-mode notification suppression. Grounded on
//! `monitor_manager.py`'s `MonitorManager.run`/`process_node`/
//! `_dispatch_alert`, with a `tokio::select!`-based main loop
//! (`main.rs`) for graceful shutdown.

use crate::config::Config;
use crate::inventory::{InventorySnapshot, InventoryStore, Node, NodeId, ProtocolMask};
use crate::logging::EventLogger;
use crate::metrics::MetricProcessor;
use crate::notifications::NotificationSink;
use crate::persistence::{MonitoringRecord, PersistenceFacade, SnmpMetricRecord};
use crate::probes::{IcmpParams, IcmpProbeDriver, PingResponse, ProbeExtra, SnmpParams, SnmpProbeDriver};
use crate::scheduler::{ConcurrencyLimiter, Scheduler};
use crate::state_machine::{ReachabilityState, ReachabilityStatus};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// A per-node snapshot exposed through `MonitorManager::snapshot` (§4.7's
/// "operational status snapshot" supplemented feature): enough to build
/// an external status view without reaching into internal bookkeeping.
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub name: String,
    pub status: ReachabilityStatus,
    pub failure_count: u32,
    pub last_latency_ms: Option<f64>,
}

struct StormTracker {
    recent_downs: VecDeque<Instant>,
    last_storm_alert: Option<Instant>,
}

impl StormTracker {
    fn new() -> Self {
        Self {
            recent_downs: VecDeque::new(),
            last_storm_alert: None,
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.recent_downs.front() {
            if now.duration_since(*front) > window {
                self.recent_downs.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records a fresh DOWN transition and returns whether this tick's
    /// individual notification should be suppressed in favor of (at most)
    /// one aggregate storm notification (§4.7.1). The threshold check runs
    /// *before* `now` is appended to history, so the Nth DOWN (not the
    /// N+1th) is still an individual notification and the threshold is
    /// only crossed once `|history|` already equals it. While a storm is
    /// ongoing, history is not appended to; once `window` has elapsed
    /// since the last aggregate announcement, the next DOWN re-announces
    /// instead of staying suppressed forever.
    fn record_down(&mut self, now: Instant, window: Duration, threshold: usize) -> StormDecision {
        self.prune(now, window);

        if self.recent_downs.len() >= threshold {
            let should_announce = match self.last_storm_alert {
                Some(last) => now.duration_since(last) >= window,
                None => true,
            };
            if should_announce {
                self.last_storm_alert = Some(now);
                StormDecision::AnnounceStorm(self.recent_downs.len())
            } else {
                StormDecision::Suppress
            }
        } else {
            self.recent_downs.push_back(now);
            StormDecision::Individual
        }
    }

    fn maybe_clear(&mut self, now: Instant, window: Duration) {
        self.prune(now, window);
    }
}

enum StormDecision {
    Individual,
    AnnounceStorm(usize),
    Suppress,
}

/// The engine's top-level driver. Owns no inventory state of its own,
/// every tick re-pulls a fresh `InventorySnapshot`, but keeps reachability
/// state, scheduler bookkeeping, and storm-throttle history across ticks.
pub struct MonitorManager {
    inventory: Arc<dyn InventoryStore>,
    scheduler: Arc<Scheduler>,
    limiter: ConcurrencyLimiter,
    icmp_driver: Arc<dyn IcmpProbeDriver>,
    snmp_driver: Arc<dyn SnmpProbeDriver>,
    persistence: Arc<PersistenceFacade>,
    metrics: Arc<MetricProcessor>,
    notifier: Arc<dyn NotificationSink>,
    logger: Arc<EventLogger>,
    config: RwLock<Config>,
    node_states: Mutex<HashMap<NodeId, ReachabilityState>>,
    storm: Mutex<StormTracker>,
    running: AtomicBool,
}

impl MonitorManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        inventory: Arc<dyn InventoryStore>,
        icmp_driver: Arc<dyn IcmpProbeDriver>,
        snmp_driver: Arc<dyn SnmpProbeDriver>,
        persistence: Arc<PersistenceFacade>,
        metrics: Arc<MetricProcessor>,
        notifier: Arc<dyn NotificationSink>,
        logger: Arc<EventLogger>,
    ) -> Self {
        let limiter = ConcurrencyLimiter::new(config.engine.concurrency_limit);
        Self {
            inventory,
            scheduler: Arc::new(Scheduler::new(Arc::new(crate::scheduler::SystemClock))),
            limiter,
            icmp_driver,
            snmp_driver,
            persistence,
            metrics,
            notifier,
            logger,
            config: RwLock::new(config),
            node_states: Mutex::new(HashMap::new()),
            storm: Mutex::new(StormTracker::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Runs the reachability tick loop and the SNMP metric collector
    /// sub-loop concurrently until `stop` is called or a shutdown signal
    /// arrives, via a `tokio::select!` over both sub-loops plus ctrl-c.
    pub async fn run(self: &Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        let tick_interval = {
            let config = self.config.read().await;
            Duration::from_millis(config.engine.scheduler_tick_ms)
        };
        let collector_interval = {
            let config = self.config.read().await;
            Duration::from_secs(config.engine.snmp_collector_interval_secs)
        };

        let reachability_loop = {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(tick_interval);
                while manager.running.load(Ordering::SeqCst) {
                    ticker.tick().await;
                    manager.tick().await;
                }
            })
        };

        let collector_loop = {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(collector_interval);
                while manager.running.load(Ordering::SeqCst) {
                    ticker.tick().await;
                    manager.collect_snmp_metrics().await;
                }
            })
        };

        tokio::select! {
            _ = reachability_loop => {}
            _ = collector_loop => {}
            _ = tokio::signal::ctrl_c() => {
                self.stop();
            }
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Drives a single reachability tick without the background loop,
    /// exposed for integration tests so they can assert on one tick's
    /// effects deterministically.
    #[cfg(any(test, feature = "test-support"))]
    pub async fn tick_once(self: &Arc<Self>) {
        self.tick().await;
    }

    /// Drives a single SNMP metric-collector pass, same rationale as
    /// `tick_once`.
    #[cfg(any(test, feature = "test-support"))]
    pub async fn collect_snmp_metrics_once(self: &Arc<Self>) {
        self.collect_snmp_metrics().await;
    }

    /// One pass over the inventory: orphan/disabled/paused nodes are
    /// skipped, due nodes are probed under the concurrency limiter, and
    /// the reachability state machine is applied to each result (§4.7,
    /// tick algorithm steps 1-6).
    async fn tick(self: &Arc<Self>) {
        let snapshot = match self.inventory.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.logger.debug("MonitorManager", "inventory_error", &e.to_string());
                return;
            }
        };

        let mut handles = Vec::new();
        for node in snapshot.nodes.values() {
            if snapshot.is_orphaned(node) || snapshot.is_node_disabled(node) {
                self.write_paused_record(node, &snapshot).await;
                continue;
            }

            let is_pending = {
                let states = self.node_states.lock().await;
                states
                    .get(&node.id)
                    .map(|s| s.status == ReachabilityStatus::Pending)
                    .unwrap_or(false)
            };
            {
                let states = self.node_states.lock().await;
                if states.get(&node.id).map(|s| s.status == ReachabilityStatus::Paused).unwrap_or(false) {
                    continue;
                }
            }

            let base_interval = Duration::from_secs(snapshot.effective_interval_secs(node));
            let effective = Scheduler::effective_interval(base_interval, is_pending);
            if !self.scheduler.due(&node.id, effective).await {
                continue;
            }
            self.scheduler.mark_checked(&node.id).await;

            let manager = Arc::clone(self);
            let node = node.clone();
            let snapshot = snapshot.clone();
            handles.push(tokio::spawn(async move {
                let _permit = manager.limiter.acquire().await;
                manager.probe_node(&node, &snapshot).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    /// §4.7 tick step 2: an orphaned or operator-disabled node gets no
    /// probe this tick. Writes a PAUSED reachability record (so downstream
    /// consumers age out a stale DOWN/PENDING reading rather than seeing
    /// the last real probe result forever), drops the node's
    /// `ReachabilityState` to PAUSED, and clears any active alert state for
    /// its metric bindings so a later re-enable starts clean.
    async fn write_paused_record(&self, node: &Node, snapshot: &InventorySnapshot) {
        {
            let mut states = self.node_states.lock().await;
            let state = states.entry(node.id.clone()).or_default();
            state.pause();
        }
        for node_metric in snapshot.node_metrics_for(&node.id) {
            self.metrics.clear_on_pause(&node_metric.id).await;
        }

        let group_name = snapshot.group_for(node).map(|g| g.name.clone()).unwrap_or_default();
        self.persistence
            .write_monitoring(MonitoringRecord {
                node: node.name.clone(),
                ip: node.ip.to_string(),
                group: group_name,
                protocol: "none".to_string(),
                status: ReachabilityStatus::Paused.as_str().to_string(),
                success: false,
                latency_ms: None,
                packet_loss: None,
                ping_responses: None,
            })
            .await;
    }

    async fn probe_node(self: &Arc<Self>, node: &Node, snapshot: &InventorySnapshot) {
        let protocol_mask = snapshot.effective_protocol_mask(node);
        let (success, latency_ms, extra) = self.run_probes(node, snapshot, &protocol_mask).await;

        self.logger.probe_start(&node.id, if protocol_mask.icmp { "icmp" } else { "snmp" });

        let max_retries = snapshot.effective_max_retries(node);
        let now = std::time::SystemTime::now();
        let transition = {
            let mut states = self.node_states.lock().await;
            let state = states.entry(node.id.clone()).or_default();
            state.apply(success, max_retries, now)
        };

        self.logger.probe_end(
            &node.id,
            if protocol_mask.icmp { "icmp" } else { "snmp" },
            success,
            latency_ms,
        );

        if transition.from != transition.to {
            self.logger
                .state_transition(&node.id, transition.from.as_str(), transition.to.as_str());
        }

        let group_name = snapshot
            .group_for(node)
            .map(|g| g.name.clone())
            .unwrap_or_default();
        self.persistence
            .write_monitoring(MonitoringRecord {
                node: node.name.clone(),
                ip: node.ip.to_string(),
                group: group_name,
                protocol: if protocol_mask.icmp { "icmp".to_string() } else { "snmp".to_string() },
                status: transition.to.as_str().to_string(),
                success,
                latency_ms,
                packet_loss: extra.packet_loss,
                ping_responses: responses_as_json(&extra.responses),
            })
            .await;

        if transition.entered_down {
            self.dispatch_down_notification(node).await;
        } else if transition.from == ReachabilityStatus::Down && transition.to == ReachabilityStatus::Up {
            self.dispatch_recovery_notification(node).await;
        }
    }

    async fn run_probes(
        &self,
        node: &Node,
        snapshot: &InventorySnapshot,
        protocol_mask: &ProtocolMask,
    ) -> (bool, Option<f64>, ProbeExtra) {
        let mut overall_success = true;
        let mut latency_ms = None;
        let mut extra = ProbeExtra::default();

        if protocol_mask.icmp {
            let params = IcmpParams {
                target: node.ip,
                count: snapshot.effective_packet_count(node),
                per_packet_timeout: Duration::from_secs(2),
            };
            let result = self.icmp_driver.probe(&params).await;
            overall_success &= result.success;
            latency_ms = result.latency_ms;
            extra = result.extra;
        }

        if protocol_mask.snmp {
            let params = SnmpParams {
                target: node.ip,
                port: snapshot.effective_snmp_port(node),
                community: snapshot.effective_snmp_community(node),
                timeout: Duration::from_secs(5),
            };
            let result = self.snmp_driver.probe(&params).await;
            overall_success &= result.success;
            if latency_ms.is_none() {
                latency_ms = result.latency_ms;
            }
            extra.uptime_ticks = result.extra.uptime_ticks;
        }

        (overall_success, latency_ms, extra)
    }

    async fn dispatch_down_notification(&self, node: &Node) {
        let maintenance = self.config.read().await.pushover.maintenance_mode;
        if maintenance {
            return;
        }

        let throttling_enabled = self.config.read().await.pushover.throttling_enabled;
        if !throttling_enabled {
            self.send_down_notification(node).await;
            return;
        }

        let (threshold, window) = {
            let config = self.config.read().await;
            (
                config.pushover.alert_threshold,
                Duration::from_secs(config.pushover.alert_window_secs),
            )
        };
        let decision = {
            let mut storm = self.storm.lock().await;
            storm.record_down(Instant::now(), window, threshold)
        };
        match decision {
            StormDecision::Individual => self.send_down_notification(node).await,
            StormDecision::AnnounceStorm(count) => {
                self.notifier
                    .send(
                        "Network storm detected",
                        &format!("{count} nodes went DOWN within the alert window; further individual alerts are suppressed until the rate subsides"),
                        1,
                    )
                    .await;
            }
            StormDecision::Suppress => {}
        }
    }

    async fn send_down_notification(&self, node: &Node) {
        let priority = node.notification_priority.unwrap_or(0);
        self.notifier
            .send(
                &format!("{} is DOWN", node.name),
                &format!("{} ({}) stopped responding", node.name, node.ip),
                priority,
            )
            .await;
    }

    async fn dispatch_recovery_notification(&self, node: &Node) {
        let maintenance = self.config.read().await.pushover.maintenance_mode;
        if maintenance {
            return;
        }
        let window = {
            let config = self.config.read().await;
            Duration::from_secs(config.pushover.alert_window_secs)
        };
        self.storm.lock().await.maybe_clear(Instant::now(), window);

        self.notifier
            .send(
                &format!("{} is back UP", node.name),
                &format!("{} ({}) is responding again", node.name, node.ip),
                0,
            )
            .await;
    }

    /// Independent SNMP metric collector sub-loop (§4.7): pulls every
    /// enabled `NodeMetric` bound to an SNMP `MetricDefinition`, GETs its
    /// OID, coerces/evaluates through the metric processor, and persists.
    async fn collect_snmp_metrics(self: &Arc<Self>) {
        let snapshot = match self.inventory.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.logger.debug("MetricCollector", "inventory_error", &e.to_string());
                return;
            }
        };

        for node_metric in snapshot.node_metrics.values() {
            if !node_metric.enabled {
                continue;
            }
            let Some(node) = snapshot.nodes.get(&node_metric.node_id) else {
                continue;
            };
            if snapshot.is_orphaned(node) || snapshot.is_node_disabled(node) {
                continue;
            }
            let Some(definition) = snapshot.metric_definitions.get(&node_metric.metric_definition_id) else {
                continue;
            };
            if definition.source != crate::inventory::MetricSource::Snmp {
                continue;
            }

            {
                let states = self.node_states.lock().await;
                if states.get(&node.id).map(|s| s.status == ReachabilityStatus::Paused).unwrap_or(false) {
                    self.metrics.clear_on_pause(&node_metric.id).await;
                    continue;
                }
            }

            let oid = render_oid(&definition.oid_template, node_metric.interface_index);
            let community = snapshot.effective_snmp_community(node);
            let port = snapshot.effective_snmp_port(node);

            let raw = match self
                .snmp_driver
                .get_scalar(node.ip, port, &community, &oid, Duration::from_secs(5))
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    self.logger
                        .debug("MetricCollector", "snmp_get_error", &format!("{}: {e}", node.id));
                    continue;
                }
            };

            let Some(sample) = self.metrics.coerce(node_metric, definition, &raw).await else {
                continue;
            };

            let group_name = snapshot.group_for(node).map(|g| g.name.clone()).unwrap_or_default();
            self.persistence
                .write_snmp_metric(SnmpMetricRecord {
                    node: node.name.clone(),
                    ip: node.ip.to_string(),
                    group: group_name,
                    metric: definition.name.clone(),
                    unit: sample.unit.clone(),
                    interface: node_metric.interface_name.clone(),
                    metric_type: format!("{:?}", definition.kind).to_lowercase(),
                    value: sample.value,
                })
                .await;

            self.metrics.evaluate(&sample, node_metric, node, &definition.name).await;
        }
    }

    /// Operator-disable (§4.7): drop to PAUSED and clear any active alert
    /// state for the node's metric bindings so a subsequent resume starts
    /// clean.
    pub async fn mark_paused(&self, node_id: &str) {
        let mut states = self.node_states.lock().await;
        let state = states.entry(node_id.to_string()).or_default();
        state.pause();
    }

    pub async fn mark_unpaused(&self, node_id: &str) {
        {
            let mut states = self.node_states.lock().await;
            let state = states.entry(node_id.to_string()).or_default();
            state.unpause();
        }
        self.scheduler.trigger_immediate(node_id).await;
    }

    pub async fn trigger_immediate(&self, node_id: &str) {
        self.scheduler.trigger_immediate(node_id).await;
    }

    pub async fn remove(&self, node_id: &str) {
        self.scheduler.remove(node_id).await;
        self.node_states.lock().await.remove(node_id);
    }

    pub async fn reload_config(&self, config: Config) {
        self.persistence.reload_config(&config.persistence).await;
        *self.config.write().await = config;
    }

    pub async fn status(&self) -> HashMap<NodeId, ReachabilityStatus> {
        let snapshot = self.inventory.snapshot().await.unwrap_or_default();
        let raw: Vec<(NodeId, ReachabilityStatus)> = {
            let states = self.node_states.lock().await;
            states.iter().map(|(id, state)| (id.clone(), state.status)).collect()
        };

        let mut out = HashMap::with_capacity(raw.len());
        for (id, status) in raw {
            let effective = self.fold_in_metric_alerts(&id, status, &snapshot).await;
            out.insert(id, effective);
        }
        out
    }

    pub async fn snapshot(&self, inventory: &InventorySnapshot) -> Vec<NodeStatus> {
        let raw: Vec<(NodeId, String, ReachabilityStatus, u32)> = {
            let states = self.node_states.lock().await;
            inventory
                .nodes
                .values()
                .map(|node| {
                    let state = states.get(&node.id);
                    (
                        node.id.clone(),
                        node.name.clone(),
                        state.map(|s| s.status).unwrap_or(ReachabilityStatus::Up),
                        state.map(|s| s.failure_count).unwrap_or(0),
                    )
                })
                .collect()
        };

        let mut out = Vec::with_capacity(raw.len());
        for (node_id, name, status, failure_count) in raw {
            let status = self.fold_in_metric_alerts(&node_id, status, inventory).await;
            out.push(NodeStatus {
                node_id,
                name,
                status,
                failure_count,
                last_latency_ms: None,
            });
        }
        out
    }

    /// Folds a node's metric alerts into its reported reachability (a
    /// supplemented feature of §4.7.1/§4.6: a CRITICAL metric alert reports
    /// the node DOWN, a WARNING one reports it PENDING). Only overlays when
    /// the probe-driven status is UP: a probe-driven PENDING/DOWN already
    /// signals a problem, and PAUSED is an operator override that should
    /// never be escalated by a stale metric alert.
    async fn fold_in_metric_alerts(
        &self,
        node_id: &str,
        probe_status: ReachabilityStatus,
        snapshot: &InventorySnapshot,
    ) -> ReachabilityStatus {
        if probe_status != ReachabilityStatus::Up {
            return probe_status;
        }
        let binding_ids: Vec<String> = snapshot.node_metrics_for(node_id).map(|m| m.id.clone()).collect();
        if binding_ids.is_empty() {
            return probe_status;
        }
        match self.metrics.worst_level_for(&binding_ids).await {
            Some(crate::metrics::AlertLevel::Critical) => ReachabilityStatus::Down,
            Some(crate::metrics::AlertLevel::Warning) => ReachabilityStatus::Pending,
            None => probe_status,
        }
    }
}

fn render_oid(template: &str, interface_index: Option<u32>) -> String {
    match interface_index {
        Some(index) => template.replace("{index}", &index.to_string()),
        None => template.to_string(),
    }
}

fn responses_as_json(responses: &[PingResponse]) -> Option<serde_json::Value> {
    if responses.is_empty() {
        None
    } else {
        serde_json::to_value(responses).ok()
    }
}

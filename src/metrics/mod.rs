//! Metric Processor (§4.5): coerces a raw SNMP scalar into a typed sample,
//! derives a rate for counters (with wraparound detection), evaluates
//! warning/critical thresholds with hysteresis, and dispatches
//! threshold-crossing notifications with a per-binding cooldown. Grounded
//! on `metrics_processor.py`'s `MetricsProcessor.process_metric`.

mod alert_state;

pub use alert_state::{AlertLevel, AlertStateStore};

use crate::error::NetsentryError;
use crate::inventory::{Comparator, MetricDefinition, MetricKind, Node, NodeMetric};
use crate::logging::EventLogger;
use crate::notifications::NotificationSink;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// 5% buffer applied around a threshold before an active alert clears, so a
/// value oscillating right at the line doesn't flap (§4.5 hysteresis).
const HYSTERESIS_RATIO: f64 = 0.05;

/// Shared cooldown between an alert firing and its resolved notification,
/// and between repeat alerts for the same binding (Open Question, resolved
/// as a single shared window).
const NOTIFICATION_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedSample {
    pub node_metric_id: String,
    pub value: f64,
    pub unit: String,
}

/// One raw scalar read off the wire plus the timestamp it was taken, kept
/// around so the next sample can derive a counter rate.
#[derive(Debug, Clone, Copy)]
struct PreviousSample {
    value: f64,
    at: Instant,
}

struct Binding {
    last_notified: Option<Instant>,
}

/// Per-process, in-memory bookkeeping (previous counter samples, last
/// notification time per binding) plus the on-disk alert-level state that
/// survives a restart.
pub struct MetricProcessor {
    previous_samples: Mutex<HashMap<String, PreviousSample>>,
    bindings: Mutex<HashMap<String, Binding>>,
    alert_levels: Mutex<HashMap<String, AlertLevel>>,
    alert_store: AlertStateStore,
    notifier: Arc<dyn NotificationSink>,
    logger: Arc<EventLogger>,
}

impl MetricProcessor {
    pub fn new(
        alert_store: AlertStateStore,
        notifier: Arc<dyn NotificationSink>,
        logger: Arc<EventLogger>,
    ) -> Self {
        let alert_levels = alert_store.load();
        Self {
            previous_samples: Mutex::new(HashMap::new()),
            bindings: Mutex::new(HashMap::new()),
            alert_levels: Mutex::new(alert_levels),
            alert_store,
            notifier,
            logger,
        }
    }

    /// Coerces `raw` per the metric definition's kind, deriving a
    /// counter rate when `kind == Counter`. Returns `None` when the sample
    /// can't yet produce a value (first counter observation, or a
    /// wraparound with nothing to report); `PreviousSample` is still
    /// updated in that case so the next call has a baseline.
    pub async fn coerce(
        &self,
        node_metric: &NodeMetric,
        definition: &MetricDefinition,
        raw: &str,
    ) -> Option<ProcessedSample> {
        let now = Instant::now();
        let raw_value: f64 = raw.trim().parse().ok()?;

        let value = match definition.kind {
            MetricKind::Counter => {
                let mut previous = self.previous_samples.lock().await;
                let prev = previous.get(&node_metric.id).copied();
                previous.insert(
                    node_metric.id.clone(),
                    PreviousSample {
                        value: raw_value,
                        at: now,
                    },
                );
                let prev = prev?;
                let time_delta = now.duration_since(prev.at).as_secs_f64();
                if time_delta <= 0.0 {
                    return None;
                }
                let val_delta = raw_value - prev.value;
                if val_delta < 0.0 {
                    // Counter wraparound (or a reset): no sample this
                    // tick, but the baseline above has already advanced.
                    return None;
                }
                let mut rate = val_delta / time_delta;
                if definition.unit == "bytes" {
                    rate *= 8.0;
                }
                rate
            }
            MetricKind::Gauge | MetricKind::String => raw_value,
        };

        let unit = if definition.kind == MetricKind::Counter && definition.unit == "bytes" {
            "bps".to_string()
        } else {
            definition.unit.clone()
        };

        Some(ProcessedSample {
            node_metric_id: node_metric.id.clone(),
            value,
            unit,
        })
    }

    /// Evaluates thresholds for a processed sample and dispatches an alert
    /// or resolved notification when the binding crosses state, subject to
    /// the shared cooldown. `node`/`metric_name` are used for message
    /// formatting only.
    pub async fn evaluate(
        &self,
        sample: &ProcessedSample,
        node_metric: &NodeMetric,
        node: &Node,
        metric_name: &str,
    ) {
        let mut alert_levels = self.alert_levels.lock().await;
        let previous_level = alert_levels.get(&sample.node_metric_id).copied();
        let new_level = self.classify(sample.value, node_metric, previous_level);

        if new_level == previous_level {
            return;
        }

        if !self.cooldown_elapsed(&sample.node_metric_id).await {
            return;
        }

        let sent = match new_level {
            Some(level) => {
                alert_levels.insert(sample.node_metric_id.clone(), level);
                self.notify_threshold_crossed(node, metric_name, sample, node_metric, level)
                    .await
            }
            None => {
                alert_levels.remove(&sample.node_metric_id);
                self.notify_resolved(node, metric_name, sample).await
            }
        };

        let _ = self.alert_store.save(&alert_levels);

        if sent {
            self.mark_notified(&sample.node_metric_id).await;
        } else {
            let err = NetsentryError::NotificationDispatchFailure(format!(
                "binding {} ({metric_name})",
                sample.node_metric_id
            ));
            self.logger.debug("MetricProcessor", "notification_dispatch_failure", &err.to_string());
        }
    }

    /// Worst currently active alert level across a set of bindings (e.g.
    /// every `NodeMetric` belonging to one node), or `None` if none of them
    /// has an active alert. Used to fold metric alerts into a node's
    /// overall reported reachability (a CRITICAL metric alert reports the
    /// node DOWN, a WARNING one reports it PENDING, same as a failed probe).
    pub async fn worst_level_for(&self, node_metric_ids: &[String]) -> Option<AlertLevel> {
        let levels = self.alert_levels.lock().await;
        node_metric_ids
            .iter()
            .filter_map(|id| levels.get(id).copied())
            .max_by_key(|level| match level {
                AlertLevel::Warning => 0,
                AlertLevel::Critical => 1,
            })
    }

    /// Drops any active alert for a binding without sending a resolved
    /// notification, used when a node enters maintenance/paused state so a
    /// node coming back out of maintenance starts from a clean slate.
    pub async fn clear_on_pause(&self, node_metric_id: &str) {
        let mut alert_levels = self.alert_levels.lock().await;
        if alert_levels.remove(node_metric_id).is_some() {
            let _ = self.alert_store.save(&alert_levels);
        }
    }

    /// Classifies `value` against the binding's thresholds. `previous` is
    /// the binding's currently active level (if any): an active alert only
    /// clears once the value falls outside the threshold by the hysteresis
    /// buffer, so a value oscillating right at the line doesn't flap
    /// between levels every sample. Hysteresis only ever holds the
    /// *currently* active level against its own threshold (CRITICAL holds
    /// against the critical threshold, WARNING against the warning one); a
    /// value that falls straight past CRITICAL's hysteresis band drops to
    /// whatever the plain (non-hysteresis) thresholds say, it never gets
    /// caught by WARNING's band on the way down.
    fn classify(&self, value: f64, node_metric: &NodeMetric, previous: Option<AlertLevel>) -> Option<AlertLevel> {
        let exceeds = |threshold: f64| match node_metric.alert_condition {
            Comparator::Gt => value >= threshold,
            Comparator::Lt => value <= threshold,
        };
        let within_hysteresis = |threshold: f64| match node_metric.alert_condition {
            Comparator::Gt => value >= threshold * (1.0 - HYSTERESIS_RATIO),
            Comparator::Lt => value <= threshold * (1.0 + HYSTERESIS_RATIO),
        };

        let candidate = match node_metric.critical_threshold {
            Some(critical) if exceeds(critical) => Some(AlertLevel::Critical),
            _ => match node_metric.warning_threshold {
                Some(warning) if exceeds(warning) => Some(AlertLevel::Warning),
                _ => None,
            },
        };

        match previous {
            Some(AlertLevel::Critical) if candidate != Some(AlertLevel::Critical) => {
                match node_metric.critical_threshold {
                    Some(critical) if within_hysteresis(critical) => Some(AlertLevel::Critical),
                    _ => candidate,
                }
            }
            Some(AlertLevel::Warning) if candidate.is_none() => {
                match node_metric.warning_threshold {
                    Some(warning) if within_hysteresis(warning) => Some(AlertLevel::Warning),
                    _ => candidate,
                }
            }
            _ => candidate,
        }
    }

    async fn cooldown_elapsed(&self, node_metric_id: &str) -> bool {
        let bindings = self.bindings.lock().await;
        match bindings.get(node_metric_id).and_then(|b| b.last_notified) {
            Some(last) => last.elapsed() >= NOTIFICATION_COOLDOWN,
            None => true,
        }
    }

    async fn mark_notified(&self, node_metric_id: &str) {
        let mut bindings = self.bindings.lock().await;
        bindings.insert(
            node_metric_id.to_string(),
            Binding {
                last_notified: Some(Instant::now()),
            },
        );
    }

    async fn notify_threshold_crossed(
        &self,
        node: &Node,
        metric_name: &str,
        sample: &ProcessedSample,
        node_metric: &NodeMetric,
        level: AlertLevel,
    ) -> bool {
        let symbol = node_metric.alert_condition.symbol();
        let threshold = match level {
            AlertLevel::Critical => node_metric.critical_threshold,
            AlertLevel::Warning => node_metric.warning_threshold,
        }
        .unwrap_or(0.0);
        let title = format!("{} {}: {}", level_label(level), node.name, metric_name);
        let message = format!(
            "{} = {:.2} {} ({} {:.2})",
            metric_name, sample.value, sample.unit, symbol, threshold
        );
        let priority = match level {
            AlertLevel::Critical => node.notification_priority.unwrap_or(0).max(1),
            AlertLevel::Warning => node.notification_priority.unwrap_or(0),
        };
        self.logger
            .alert_dispatch(&sample.node_metric_id, level_label(level), false);
        self.notifier.send(&title, &message, priority).await
    }

    async fn notify_resolved(&self, node: &Node, metric_name: &str, sample: &ProcessedSample) -> bool {
        let title = format!("Resolved: {}: {}", node.name, metric_name);
        let message = format!("{} = {:.2} {} (back within threshold)", metric_name, sample.value, sample.unit);
        self.logger
            .alert_dispatch(&sample.node_metric_id, "Resolved", false);
        self.notifier.send(&title, &message, 0).await
    }
}

fn level_label(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Warning => "Warning",
        AlertLevel::Critical => "Critical",
    }
}

//! Reachability state machine (§4.6), grounded directly on
//! `monitor_manager.py::process_node`'s transition logic.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReachabilityStatus {
    Up,
    Pending,
    Down,
    Paused,
}

impl ReachabilityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReachabilityStatus::Up => "UP",
            ReachabilityStatus::Pending => "PENDING",
            ReachabilityStatus::Down => "DOWN",
            ReachabilityStatus::Paused => "PAUSED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachabilityState {
    pub status: ReachabilityStatus,
    pub failure_count: u32,
    pub first_failure_at: Option<SystemTime>,
}

impl Default for ReachabilityState {
    fn default() -> Self {
        Self {
            status: ReachabilityStatus::Up,
            failure_count: 0,
            first_failure_at: None,
        }
    }
}

/// Outcome of applying one probe result to a node's reachability state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: ReachabilityStatus,
    pub to: ReachabilityStatus,
    /// True exactly when this transition entered `DOWN` this tick, the
    /// signal §4.6 says to raise to C7 for notification.
    pub entered_down: bool,
}

impl ReachabilityState {
    /// Apply one tick's aggregated probe success (§4.6: "success is
    /// `all(probe.success for probe in enabled_probes)`") and return the
    /// transition taken. `max_retries` comes from the node/group
    /// configuration (§3, §4.1).
    pub fn apply(&mut self, success: bool, max_retries: u32, now: SystemTime) -> Transition {
        let from = self.status;

        if success {
            self.status = ReachabilityStatus::Up;
            self.failure_count = 0;
            self.first_failure_at = None;
            return Transition {
                from,
                to: self.status,
                entered_down: false,
            };
        }

        let mut entered_down = false;
        match self.status {
            ReachabilityStatus::Up => {
                self.status = ReachabilityStatus::Pending;
                self.failure_count = 1;
                self.first_failure_at = Some(now);
            }
            ReachabilityStatus::Pending => {
                self.failure_count += 1;
                if self.failure_count > max_retries {
                    self.status = ReachabilityStatus::Down;
                    entered_down = true;
                }
            }
            ReachabilityStatus::Down => {
                // stays DOWN
            }
            ReachabilityStatus::Paused => {
                // a paused node should never reach apply(); guard defensively
                // by holding PAUSED rather than silently entering PENDING.
            }
        }

        Transition {
            from,
            to: self.status,
            entered_down,
        }
    }

    /// Operator-disable: PAUSED, counters cleared (§4.6, invariant 3).
    pub fn pause(&mut self) -> Transition {
        let from = self.status;
        self.status = ReachabilityStatus::Paused;
        self.failure_count = 0;
        self.first_failure_at = None;
        Transition {
            from,
            to: self.status,
            entered_down: false,
        }
    }

    /// Operator-enable: drop back to UP and mark for immediate re-check
    /// (the caller is responsible for calling `Scheduler::trigger_immediate`).
    pub fn unpause(&mut self) -> Transition {
        let from = self.status;
        self.status = ReachabilityStatus::Up;
        self.failure_count = 0;
        self.first_failure_at = None;
        Transition {
            from,
            to: self.status,
            entered_down: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(secs)
    }

    /// S1: max_retries=3, failures at t=0,20,40,60,80 -> PENDING x4, DOWN once.
    #[test]
    fn s1_down_after_exceeding_max_retries() {
        let mut state = ReachabilityState::default();
        let mut statuses = Vec::new();
        for i in 0..5 {
            let tr = state.apply(false, 3, t(i * 20));
            statuses.push(tr.to);
        }
        assert_eq!(
            statuses,
            vec![
                ReachabilityStatus::Pending,
                ReachabilityStatus::Pending,
                ReachabilityStatus::Pending,
                ReachabilityStatus::Pending,
                ReachabilityStatus::Down,
            ]
        );
        assert_eq!(state.failure_count, 5);
    }

    /// B1: max_retries = 0 -> UP -> PENDING -> DOWN after just one more failure.
    #[test]
    fn b1_zero_max_retries_goes_down_on_second_failure() {
        let mut state = ReachabilityState::default();
        let first = state.apply(false, 0, t(0));
        assert_eq!(first.to, ReachabilityStatus::Pending);
        let second = state.apply(false, 0, t(1));
        assert_eq!(second.to, ReachabilityStatus::Down);
        assert!(second.entered_down);
    }

    /// P1: DOWN only reachable from PENDING with failure_count > max_retries.
    #[test]
    fn p1_down_only_from_pending() {
        let mut state = ReachabilityState::default();
        assert_eq!(state.status, ReachabilityStatus::Up);
        state.apply(false, 1, t(0)); // -> PENDING, count=1
        assert_eq!(state.status, ReachabilityStatus::Pending);
        let tr = state.apply(false, 1, t(1)); // count=2 > 1 -> DOWN
        assert_eq!(tr.from, ReachabilityStatus::Pending);
        assert_eq!(tr.to, ReachabilityStatus::Down);
    }

    #[test]
    fn success_resets_failure_count_from_any_state() {
        let mut state = ReachabilityState::default();
        state.apply(false, 1, t(0));
        state.apply(false, 1, t(1));
        assert_eq!(state.status, ReachabilityStatus::Down);
        let tr = state.apply(true, 1, t(2));
        assert_eq!(tr.to, ReachabilityStatus::Up);
        assert_eq!(state.failure_count, 0);
        assert!(state.first_failure_at.is_none());
    }

    /// L1: pause then unpause leaves failure_count == 0.
    #[test]
    fn l1_pause_then_unpause_resets_counters() {
        let mut state = ReachabilityState::default();
        state.apply(false, 3, t(0));
        state.apply(false, 3, t(1));
        assert!(state.failure_count > 0);
        state.pause();
        assert_eq!(state.status, ReachabilityStatus::Paused);
        assert_eq!(state.failure_count, 0);
        let tr = state.unpause();
        assert_eq!(tr.to, ReachabilityStatus::Up);
        assert_eq!(state.failure_count, 0);
    }
}

//! Clock and scheduler primitives (§4.1): monotonic time, per-node
//! "last-checked" bookkeeping, the `due` predicate, and the cooperative
//! concurrency limiter. `ClockTrait`/`SystemClock` are split out as a
//! dependency-injection seam so tests can control time without sleeping,
//! and the limiter mirrors `monitor_manager.py`'s
//! `self.semaphore = asyncio.Semaphore(32)` for the bounded fan-out.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};

#[async_trait]
pub trait ClockTrait: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

#[async_trait]
impl ClockTrait for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Per-node due-tracking and the PENDING-state retry acceleration of §4.1.
pub struct Scheduler {
    clock: Arc<dyn ClockTrait>,
    last_checked: Mutex<HashMap<String, Instant>>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn ClockTrait>) -> Self {
        Self {
            clock,
            last_checked: Mutex::new(HashMap::new()),
        }
    }

    /// `interval / 3` while PENDING (accelerated retry), else the effective
    /// heartbeat interval.
    pub fn effective_interval(base_interval: Duration, is_pending: bool) -> Duration {
        if is_pending {
            base_interval / 3
        } else {
            base_interval
        }
    }

    pub async fn due(&self, node_id: &str, effective_interval: Duration) -> bool {
        let now = self.clock.now();
        let last_checked = self.last_checked.lock().await;
        match last_checked.get(node_id) {
            Some(last) => now.duration_since(*last) >= effective_interval,
            None => true,
        }
    }

    pub async fn mark_checked(&self, node_id: &str) {
        let now = self.clock.now();
        self.last_checked.lock().await.insert(node_id.to_string(), now);
    }

    /// `trigger_immediate`: reset so the node is due at the next tick (§4.7).
    pub async fn trigger_immediate(&self, node_id: &str) {
        self.last_checked.lock().await.remove(node_id);
    }

    /// `remove`: evict all per-node runtime bookkeeping (§4.7).
    pub async fn remove(&self, node_id: &str) {
        self.last_checked.lock().await.remove(node_id);
    }

    pub async fn monitored_count(&self) -> usize {
        self.last_checked.lock().await.len()
    }
}

/// Cooperative concurrency limiter: N in-flight probes max (§4.1, §5).
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
        }
    }

    pub async fn acquire(&self) -> tokio::sync::OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed while the manager runs")
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FakeClock {
        offset_ms: AtomicU64,
        base: Instant,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                offset_ms: AtomicU64::new(0),
                base: Instant::now(),
            }
        }

        fn advance(&self, ms: u64) {
            self.offset_ms.fetch_add(ms, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ClockTrait for FakeClock {
        fn now(&self) -> Instant {
            self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn unseen_node_is_always_due() {
        let clock = Arc::new(FakeClock::new());
        let scheduler = Scheduler::new(clock);
        assert!(scheduler.due("n1", Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn node_not_due_until_interval_elapses() {
        let clock = Arc::new(FakeClock::new());
        let scheduler = Scheduler::new(clock.clone());
        scheduler.mark_checked("n1").await;
        assert!(!scheduler.due("n1", Duration::from_secs(60)).await);
        clock.advance(59_000);
        assert!(!scheduler.due("n1", Duration::from_secs(60)).await);
        clock.advance(1_000);
        assert!(scheduler.due("n1", Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn trigger_immediate_forces_due() {
        let clock = Arc::new(FakeClock::new());
        let scheduler = Scheduler::new(clock);
        scheduler.mark_checked("n1").await;
        assert!(!scheduler.due("n1", Duration::from_secs(60)).await);
        scheduler.trigger_immediate("n1").await;
        assert!(scheduler.due("n1", Duration::from_secs(60)).await);
    }

    #[test]
    fn pending_state_accelerates_interval_to_a_third() {
        let base = Duration::from_secs(60);
        assert_eq!(Scheduler::effective_interval(base, true), Duration::from_secs(20));
        assert_eq!(Scheduler::effective_interval(base, false), base);
    }

    #[tokio::test]
    async fn limiter_bounds_concurrent_permits() {
        let limiter = ConcurrencyLimiter::new(2);
        let p1 = limiter.acquire().await;
        let p2 = limiter.acquire().await;
        assert_eq!(limiter.available_permits(), 0);
        drop(p1);
        assert_eq!(limiter.available_permits(), 1);
        drop(p2);
    }
}

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};

/// An independent, owned copy of the metrics at a point in time. Mutating a
/// snapshot never affects the live [`HealthMetrics`] or any other snapshot.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub success_count: u64,
    pub failure_count: u64,
    pub queue_depth: i64,
    pub breaker_state: i64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub uptime_ms: u64,
}

/// Monotonic counters and gauges for pipeline health.
pub struct HealthMetrics {
    success_count: AtomicU64,
    failure_count: AtomicU64,
    queue_depth: AtomicI64,
    breaker_state: AtomicI64,
    last_success_ms: AtomicI64,
    last_failure_ms: AtomicI64,
    start_time: Instant,
    epoch: DateTime<Utc>,
}

const NO_TIMESTAMP: i64 = -1;

impl HealthMetrics {
    pub fn new() -> Self {
        Self {
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            queue_depth: AtomicI64::new(0),
            breaker_state: AtomicI64::new(0),
            last_success_ms: AtomicI64::new(NO_TIMESTAMP),
            last_failure_ms: AtomicI64::new(NO_TIMESTAMP),
            start_time: Instant::now(),
            epoch: Utc::now(),
        }
    }

    pub fn record_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.last_success_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.last_failure_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    /// Rejects negative depths by clamping to zero.
    pub fn set_queue_depth(&self, depth: i64) {
        self.queue_depth.store(depth.max(0), Ordering::Relaxed);
    }

    pub fn set_breaker_state(&self, state: i64) {
        self.breaker_state.store(state, Ordering::Relaxed);
    }

    fn now_ms(&self) -> i64 {
        self.start_time.elapsed().as_millis() as i64
    }

    fn to_timestamp(&self, elapsed_ms: i64) -> Option<DateTime<Utc>> {
        if elapsed_ms < 0 {
            None
        } else {
            Some(self.epoch + chrono::Duration::milliseconds(elapsed_ms))
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            breaker_state: self.breaker_state.load(Ordering::Relaxed),
            last_success: self.to_timestamp(self.last_success_ms.load(Ordering::Relaxed)),
            last_failure: self.to_timestamp(self.last_failure_ms.load(Ordering::Relaxed)),
            uptime_ms: self.start_time.elapsed().as_millis() as u64,
        }
    }

    /// Zeroes counters/gauges for test isolation. `start_time` (and thus
    /// uptime) is never reset.
    pub fn reset(&self) {
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.queue_depth.store(0, Ordering::Relaxed);
        self.breaker_state.store(0, Ordering::Relaxed);
        self.last_success_ms.store(NO_TIMESTAMP, Ordering::Relaxed);
        self.last_failure_ms.store(NO_TIMESTAMP, Ordering::Relaxed);
    }
}

impl Default for HealthMetrics {
    fn default() -> Self {
        Self::new()
    }
}

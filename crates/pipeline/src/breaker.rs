use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use common::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// The outcome of a guarded call: either the breaker refused to run `op` at
/// all, or it ran `op` and `op` itself failed.
#[derive(Debug)]
pub enum BreakerOutcome<E> {
    Open,
    Inner(E),
}

struct Inner {
    state: BreakerState,
    failures: u32,
    successes: u64,
    next_attempt_time: Option<Instant>,
    window_start: Instant,
}

/// A three-state guard (Closed/Open/Half-Open) with exponential backoff and
/// a rolling monitoring window that resets failure/success counters while
/// closed.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    reset_timeout: Duration,
    monitoring_period: Duration,
}

const MAX_BACKOFF_MULTIPLIER: u32 = 8;

impl CircuitBreaker {
    pub fn new(
        failure_threshold: u32,
        reset_timeout: Duration,
        monitoring_period: Duration,
    ) -> Result<Self, PipelineError> {
        if failure_threshold == 0 || reset_timeout.is_zero() || monitoring_period.is_zero() {
            return Err(PipelineError::Configuration(
                "breaker parameters must all be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                successes: 0,
                next_attempt_time: None,
                window_start: Instant::now(),
            }),
            failure_threshold,
            reset_timeout,
            monitoring_period,
        })
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker mutex poisoned").state
    }

    fn backoff_multiplier(&self, failures: u32) -> u32 {
        let exponent = failures.saturating_sub(self.failure_threshold);
        2u32.checked_pow(exponent)
            .map(|v| v.min(MAX_BACKOFF_MULTIPLIER))
            .unwrap_or(MAX_BACKOFF_MULTIPLIER)
    }

    fn sample_window(&self, inner: &mut Inner, now: Instant) {
        if now.duration_since(inner.window_start) >= self.monitoring_period {
            inner.window_start = now;
            if inner.state == BreakerState::Closed {
                inner.failures = 0;
                inner.successes = 0;
            }
        }
    }

    /// Returns `true` if `op` should be invoked, performing the Open ->
    /// Half-Open transition in the same critical section if the reset
    /// timeout has elapsed.
    fn admit(&self, inner: &mut Inner, now: Instant) -> bool {
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => match inner.next_attempt_time {
                Some(t) if now >= t => {
                    inner.state = BreakerState::HalfOpen;
                    true
                }
                _ => false,
            },
        }
    }

    fn record_success(&self, inner: &mut Inner) {
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.failures = 0;
                inner.next_attempt_time = None;
                inner.successes += 1;
            }
            BreakerState::Closed => {
                inner.successes += 1;
            }
            BreakerState::Open => {}
        }
    }

    fn record_failure(&self, inner: &mut Inner, now: Instant) {
        inner.failures += 1;
        let should_open = match inner.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => inner.failures >= self.failure_threshold,
            BreakerState::Open => false,
        };
        if should_open {
            inner.state = BreakerState::Open;
            let multiplier = self.backoff_multiplier(inner.failures);
            inner.next_attempt_time = Some(now + self.reset_timeout * multiplier);
        }
    }

    /// Guard an async operation. If the breaker is Open before the reset
    /// timeout, `op` is never invoked.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerOutcome<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let now = Instant::now();
        let allowed = {
            let mut inner = self.inner.lock().expect("breaker mutex poisoned");
            self.sample_window(&mut inner, now);
            self.admit(&mut inner, now)
        };

        if !allowed {
            return Err(BreakerOutcome::Open);
        }

        match op().await {
            Ok(value) => {
                let mut inner = self.inner.lock().expect("breaker mutex poisoned");
                self.record_success(&mut inner);
                Ok(value)
            }
            Err(err) => {
                let now = Instant::now();
                let mut inner = self.inner.lock().expect("breaker mutex poisoned");
                self.record_failure(&mut inner, now);
                Err(BreakerOutcome::Inner(err))
            }
        }
    }
}

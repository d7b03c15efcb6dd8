use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{CategorizedError, ErrorCategory, ExecutionRecord, PipelineConfig};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::breaker::{BreakerOutcome, BreakerState, CircuitBreaker};
use crate::fallback::FallbackLog;
use crate::metrics::HealthMetrics;
use crate::producer::KafkaProducer;
use crate::queue::MessageQueue;

/// Orchestrates ingestion, the immediate-send fast path, queueing, periodic
/// batch flush, reconnection, and graceful shutdown. Never lets an error
/// escape to the caller: the host proceeds exactly as if no logger were
/// present.
pub struct PipelineService {
    config: PipelineConfig,
    queue: MessageQueue<ExecutionRecord>,
    breaker: CircuitBreaker,
    producer: Arc<dyn KafkaProducer>,
    metrics: HealthMetrics,
    fallback: FallbackLog,
    enabled: AtomicBool,
    initialized: AtomicBool,
    shutting_down: AtomicBool,
    ticker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

fn disables_pipeline(category: ErrorCategory) -> bool {
    matches!(category, ErrorCategory::Configuration | ErrorCategory::Authentication)
}

impl PipelineService {
    pub fn new(
        config: PipelineConfig,
        producer: Arc<dyn KafkaProducer>,
        fallback: FallbackLog,
    ) -> Result<Self, common::PipelineError> {
        config.validate()?;
        let queue = MessageQueue::new(config.queue.max_size)?;
        let breaker = CircuitBreaker::new(
            config.breaker.failure_threshold,
            std::time::Duration::from_millis(config.breaker.reset_timeout_ms),
            std::time::Duration::from_millis(config.breaker.monitoring_period_ms),
        )?;
        let enabled = config.enabled;
        Ok(Self {
            config,
            queue,
            breaker,
            producer,
            metrics: HealthMetrics::new(),
            fallback,
            enabled: AtomicBool::new(enabled),
            initialized: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            ticker: std::sync::Mutex::new(None),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.initialized.load(Ordering::SeqCst) && self.enabled.load(Ordering::SeqCst)
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Load & validate config, construct sub-components, attempt an initial
    /// connect, and start the periodic flusher. Never returns an error to
    /// the caller: connect failures are classified and either disable the
    /// pipeline or are logged and retried on the next flush tick.
    pub async fn initialize(self: &Arc<Self>) {
        if !self.config.enabled {
            info!("pipeline disabled by configuration, skipping initialization");
            self.initialized.store(true, Ordering::SeqCst);
            return;
        }

        let producer = Arc::clone(&self.producer);
        match self.breaker.execute(|| async move { producer.connect().await }).await {
            Ok(()) => info!("kafka producer connected"),
            Err(BreakerOutcome::Open) => warn!("breaker open during initial connect, will retry on flush"),
            Err(BreakerOutcome::Inner(e)) => {
                let categorized: CategorizedError = (&e).into();
                if disables_pipeline(categorized.category) {
                    error!(category = ?categorized.category, "disabling pipeline after connect failure");
                    self.disable();
                } else {
                    warn!(category = ?categorized.category, "connect failed, records will queue until connectivity returns");
                }
            }
        }

        let flush_interval = std::time::Duration::from_millis(self.config.queue.flush_interval_ms);
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(flush_interval);
            loop {
                interval.tick().await;
                service.flush().await;
            }
        });
        *self.ticker.lock().expect("ticker mutex poisoned") = Some(handle);

        self.initialized.store(true, Ordering::SeqCst);
        info!("pipeline initialized");
    }

    /// Update the queue-depth and breaker-state gauges from live state.
    fn refresh_gauges(&self) {
        self.metrics.set_queue_depth(self.queue.size() as i64);
        self.metrics.set_breaker_state(self.breaker.state() as i64);
    }

    pub async fn ingest(&self, record: ExecutionRecord) {
        if !self.is_enabled() {
            return;
        }
        self.refresh_gauges();

        let fast_path = self.breaker.state() == BreakerState::Closed
            && self.producer.is_connected().await
            && self.queue.is_empty();

        if fast_path {
            let producer = Arc::clone(&self.producer);
            let to_send = record.clone();
            let outcome = self
                .breaker
                .execute(|| async move { producer.send(&to_send).await })
                .await;

            match outcome {
                Ok(()) => {
                    self.metrics.record_success();
                    return;
                }
                Err(BreakerOutcome::Open) => {
                    // fall through to enqueue
                }
                Err(BreakerOutcome::Inner(e)) => {
                    self.metrics.record_failure();
                    let categorized: CategorizedError = (&e).into();
                    if !categorized.should_retry && categorized.should_fallback {
                        self.fallback
                            .log_single(&record, &format!("Immediate send failed: {}", categorized.category.as_str()))
                            .await;
                        return;
                    }
                    // retryable or unknown: fall through to enqueue
                }
            }
        }

        let outcome = self.queue.enqueue(record);
        if !outcome.admitted_without_drop {
            if let Some(dropped) = outcome.evicted {
                self.fallback
                    .log_single(&dropped, "Queue overflow - message dropped")
                    .await;
            }
        }
        self.refresh_gauges();
    }

    pub async fn flush(&self) {
        if !self.is_enabled() {
            return;
        }
        if self.queue.is_empty() {
            return;
        }
        if self.breaker.state() == BreakerState::Open {
            return;
        }

        if !self.producer.is_connected().await {
            let producer = Arc::clone(&self.producer);
            match self.breaker.execute(|| async move { producer.connect().await }).await {
                Ok(()) => {}
                Err(BreakerOutcome::Open) => return,
                Err(BreakerOutcome::Inner(e)) => {
                    let categorized: CategorizedError = (&e).into();
                    if disables_pipeline(categorized.category) {
                        error!(category = ?categorized.category, "disabling pipeline after reconnect failure");
                        self.disable();
                    }
                    self.refresh_gauges();
                    return;
                }
            }
        }

        let batch = self.queue.dequeue_batch(self.config.queue.batch_size as isize);
        if batch.is_empty() {
            return;
        }

        let producer = Arc::clone(&self.producer);
        let to_send = batch.clone();
        let outcome = self
            .breaker
            .execute(move || async move {
                if to_send.len() == 1 {
                    producer.send(&to_send[0]).await
                } else {
                    producer.send_batch(&to_send).await
                }
            })
            .await;

        match outcome {
            Ok(()) => self.metrics.record_success(),
            Err(BreakerOutcome::Open) => {
                for record in batch {
                    self.requeue_or_fallback(record).await;
                }
            }
            Err(BreakerOutcome::Inner(e)) => {
                self.metrics.record_failure();
                let categorized: CategorizedError = (&e).into();

                if categorized.should_retry {
                    for record in batch {
                        self.requeue_or_fallback(record).await;
                    }
                } else if categorized.should_fallback {
                    self.fallback
                        .log_batch(&batch, &format!("Send failed: {}", categorized.category.as_str()))
                        .await;
                }

                if disables_pipeline(categorized.category) {
                    error!(category = ?categorized.category, "disabling pipeline after batch send failure");
                    self.disable();
                }
            }
        }

        self.refresh_gauges();
    }

    async fn requeue_or_fallback(&self, record: ExecutionRecord) {
        let outcome = self.queue.enqueue(record);
        if !outcome.admitted_without_drop {
            if let Some(dropped) = outcome.evicted {
                self.fallback
                    .log_single(&dropped, "Queue overflow - message dropped")
                    .await;
            }
        }
    }

    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.ticker.lock().expect("ticker mutex poisoned").take() {
            handle.abort();
        }

        self.flush().await;
        self.producer.disconnect().await;
        self.initialized.store(false, Ordering::SeqCst);
        info!("pipeline shut down");
    }

    pub fn metrics_snapshot(&self) -> crate::metrics::MetricsSnapshot {
        self.metrics.snapshot()
    }
}

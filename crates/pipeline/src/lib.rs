pub mod breaker;
pub mod event_builder;
pub mod fallback;
pub mod metrics;
pub mod producer;
pub mod queue;
pub mod service;

pub use breaker::{BreakerOutcome, BreakerState, CircuitBreaker};
pub use event_builder::{EventBuilder, HostInfo};
pub use fallback::FallbackLog;
pub use metrics::{HealthMetrics, MetricsSnapshot};
pub use producer::{KafkaProducer, RdKafkaProducer};
pub use queue::{EnqueueOutcome, MessageQueue};
pub use service::PipelineService;

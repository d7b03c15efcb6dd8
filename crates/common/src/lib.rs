pub mod config;
pub mod context;
pub mod errors;
pub mod record;

pub use config::{BreakerConfig, ConfigLoader, KafkaAuth, KafkaConfig, PipelineConfig, QueueConfig, SaslMechanism, TimeoutConfig};
pub use context::{ErrorNodeRef, ExecutionContext, LifecycleEventKind, NodeDescriptor, RunError, RunSummary, WorkflowDescriptor};
pub use errors::{classify, CategorizedError, ErrorCategory, PipelineError, Severity};
pub use record::{
    AppInfo, Dimensions, EventKind, ExecutionRecord, Flags, InstanceInfo, InstanceType, Involvement,
    LibraryInfo, Metrics, N8nContext, Properties, RecordContext,
};

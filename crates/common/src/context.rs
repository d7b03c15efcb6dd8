use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which lifecycle callback fired; the input to the event builder, not to be
/// confused with [`crate::record::EventKind`], which is the output label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEventKind {
    Start,
    Complete,
    Fail,
    Cancel,
}

/// A single node in the workflow graph, as much of it as the builder needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    pub name: String,
    pub node_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDescriptor {
    pub id: String,
    pub name: String,
    pub nodes: Vec<NodeDescriptor>,
    pub version_id: Option<i64>,
}

/// A node reference attached to a run error, when the engine can pin the
/// failure to a specific node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorNodeRef {
    pub id: String,
    pub name: String,
}

/// The error carried by a failed/cancelled run, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    /// The error's declared type name, e.g. `NodeOperationError`. Preferred
    /// over substring heuristics when present.
    pub name: Option<String>,
    pub message: String,
    pub stack: Option<String>,
    pub node: Option<ErrorNodeRef>,
}

/// Outcome summary attached to a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Raw status as reported by the engine: `success`, `error`, `cancelled`,
    /// `canceled`, `crashed`, `waiting`, `running`, or something unforeseen.
    pub status: String,
    pub error: Option<RunError>,
}

/// Everything the event builder needs to produce an [`crate::record::ExecutionRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub workflow: WorkflowDescriptor,
    /// `manual`, `webhook`, `cli`, `trigger`, `retry`, or an engine-defined mode.
    pub mode: String,
    pub user_id: Option<String>,
    pub retry_of: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub run: Option<RunSummary>,
}

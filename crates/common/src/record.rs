use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which lifecycle moment a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "Workflow Started")]
    Started,
    #[serde(rename = "Workflow Completed")]
    Completed,
    #[serde(rename = "Workflow Failed")]
    Failed,
    #[serde(rename = "Workflow Cancelled")]
    Cancelled,
}

/// Low-cardinality facets of an execution, suitable for grouping/filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimensions {
    pub execution_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_type: Option<String>,
    pub workflow_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

/// Boolean facets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Flags {
    pub is_manual_execution: bool,
    pub is_retry: bool,
}

/// Numeric facets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Metrics {
    pub node_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

/// One side of an `involves` pair: who/what this record concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Involvement {
    pub role: String,
    pub id: String,
    pub id_type: String,
}

impl Involvement {
    pub fn workflow_execution(execution_id: impl Into<String>) -> Self {
        Self {
            role: "WorkflowExecution".to_string(),
            id: execution_id.into(),
            id_type: "n8n".to_string(),
        }
    }

    pub fn workflow(workflow_id: impl Into<String>) -> Self {
        Self {
            role: "Workflow".to_string(),
            id: workflow_id.into(),
            id_type: "n8n".to_string(),
        }
    }
}

/// High-cardinality attributes, safe to omit from low-cardinality indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Properties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    Main,
    Worker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub instance_type: InstanceType,
}

/// Engine-specific block nested inside [`RecordContext`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct N8nContext {
    pub execution_mode: String,
    pub instance_type: InstanceType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordContext {
    pub app: AppInfo,
    pub library: LibraryInfo,
    pub instance: InstanceInfo,
    pub n8n: N8nContext,
}

/// The wire payload delivered to Kafka.
///
/// In normal operation every record is produced by `EventBuilder::build` in
/// the `pipeline` crate. Fields are plain `pub`, matching the rest of this
/// crate's data types; nothing stops a caller from constructing or mutating
/// one directly, so treat `EventBuilder::build` as the convention, not an
/// enforced boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub event: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "anonymousId")]
    pub anonymous_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "messageId")]
    pub message_id: Uuid,
    pub dimensions: Dimensions,
    pub flags: Flags,
    pub metrics: Metrics,
    pub tags: Vec<String>,
    pub involves: [Involvement; 2],
    pub properties: Properties,
    pub context: RecordContext,
}

impl ExecutionRecord {
    /// `type=="track"`, exactly one of `userId`/`anonymousId`, non-empty event.
    pub fn is_valid(&self) -> bool {
        self.record_type == "track"
            && (self.user_id.is_some() ^ self.anonymous_id.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExecutionRecord {
        ExecutionRecord {
            record_type: "track".to_string(),
            event: EventKind::Started,
            user_id: Some("user-789".to_string()),
            anonymous_id: None,
            timestamp: Utc::now(),
            message_id: Uuid::new_v4(),
            dimensions: Dimensions {
                execution_mode: "manual".to_string(),
                status: None,
                version: None,
                environment: None,
                trigger_type: Some("manual".to_string()),
                workflow_name: "Test Workflow".to_string(),
                error_type: None,
            },
            flags: Flags {
                is_manual_execution: true,
                is_retry: false,
            },
            metrics: Metrics {
                node_count: 2,
                duration_ms: None,
            },
            tags: vec![],
            involves: [
                Involvement::workflow_execution("exec-456"),
                Involvement::workflow("workflow-123"),
            ],
            properties: Properties {
                trigger_node: None,
                retry_of: None,
                started_at: Utc::now(),
                finished_at: None,
                error_message: None,
                error_stack: None,
                error_node_id: None,
                error_node_name: None,
                workflow_version: Some("1".to_string()),
            },
            context: RecordContext {
                app: AppInfo {
                    name: "n8n".to_string(),
                    version: "1.0.0".to_string(),
                },
                library: LibraryInfo {
                    name: "n8n-kafka-execution-logger".to_string(),
                    version: "0.1.0".to_string(),
                },
                instance: InstanceInfo {
                    id: "host-1".to_string(),
                    instance_type: InstanceType::Main,
                },
                n8n: N8nContext {
                    execution_mode: "manual".to_string(),
                    instance_type: InstanceType::Main,
                },
            },
        }
    }

    #[test]
    fn valid_record_round_trips_through_json() {
        let record = sample();
        assert!(record.is_valid());

        let json = serde_json::to_string(&record).expect("serialize");
        let back: ExecutionRecord = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(back.message_id, record.message_id);
        assert_eq!(back.dimensions.workflow_name, "Test Workflow");
        assert_eq!(back.event, EventKind::Started);
    }

    #[test]
    fn both_ids_present_is_invalid() {
        let mut record = sample();
        record.anonymous_id = Some("anon_exec-456".to_string());
        assert!(!record.is_valid());
    }

    #[test]
    fn neither_id_present_is_invalid() {
        let mut record = sample();
        record.user_id = None;
        assert!(!record.is_valid());
    }

    #[test]
    fn wire_field_names_match_the_track_schema() {
        let record = sample();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "track");
        assert_eq!(json["event"], "Workflow Started");
        assert!(json.get("userId").is_some());
        assert!(json.get("anonymousId").is_none());
        assert!(json.get("messageId").is_some());
    }
}

use chrono::Utc;
use common::{
    AppInfo, Dimensions, ErrorNodeRef, EventKind, ExecutionContext, Flags, InstanceInfo,
    InstanceType, Involvement, LibraryInfo, LifecycleEventKind, Metrics, N8nContext, Properties,
    RecordContext, RunError, WorkflowDescriptor,
};
use common::ExecutionRecord;
use uuid::Uuid;

fn event_kind_for(kind: LifecycleEventKind) -> EventKind {
    match kind {
        LifecycleEventKind::Start => EventKind::Started,
        LifecycleEventKind::Complete => EventKind::Completed,
        LifecycleEventKind::Fail => EventKind::Failed,
        LifecycleEventKind::Cancel => EventKind::Cancelled,
    }
}

/// Host-provided facts that do not travel on [`ExecutionContext`] because
/// they describe the *instance*, not the execution.
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub app_version: String,
    pub library_version: String,
    pub instance_id: String,
    pub instance_type: InstanceType,
}

impl Default for HostInfo {
    fn default() -> Self {
        Self {
            app_version: "unknown".to_string(),
            library_version: env!("CARGO_PKG_VERSION").to_string(),
            instance_id: "unknown".to_string(),
            instance_type: InstanceType::Main,
        }
    }
}

fn infer_trigger_type(mode: &str, workflow: &WorkflowDescriptor) -> Option<String> {
    match mode {
        "manual" => Some("manual".to_string()),
        "webhook" => Some("webhook".to_string()),
        "cli" => Some("cli".to_string()),
        "trigger" => {
            let has = |needle: &str| {
                workflow
                    .nodes
                    .iter()
                    .any(|n| n.node_type.to_lowercase().contains(needle))
            };
            if has("cron") || has("schedule") {
                Some("schedule".to_string())
            } else if has("webhook") {
                Some("webhook".to_string())
            } else {
                Some("trigger".to_string())
            }
        }
        other => Some(other.to_string()),
    }
}

fn normalize_status(raw: &str) -> String {
    match raw {
        "canceled" => "cancelled".to_string(),
        "crashed" => "error".to_string(),
        other => other.to_string(),
    }
}

fn classify_run_error(err: &RunError) -> String {
    if let Some(name) = &err.name {
        if !name.is_empty() {
            return name.clone();
        }
    }
    let upper = err.message.to_uppercase();
    if upper.contains("ECONNREFUSED") {
        "ConnectionRefused".to_string()
    } else if upper.contains("ETIMEDOUT") {
        "Timeout".to_string()
    } else if upper.contains("ENOTFOUND") {
        "DNSError".to_string()
    } else {
        "Unknown".to_string()
    }
}

/// Pure transformer from host execution context to the wire record. Never
/// touches the clock or a source of randomness except to stamp the record's
/// own `timestamp`/`messageId` at construction.
pub struct EventBuilder {
    host: HostInfo,
}

impl EventBuilder {
    pub fn new(host: HostInfo) -> Self {
        Self { host }
    }

    pub fn build(&self, ctx: &ExecutionContext, kind: LifecycleEventKind) -> ExecutionRecord {
        let event = event_kind_for(kind);
        let is_terminal = !matches!(event, EventKind::Started);

        let status = ctx.run.as_ref().map(|r| normalize_status(&r.status));
        let trigger_type = infer_trigger_type(&ctx.mode, &ctx.workflow);

        let duration_ms = if is_terminal {
            match (ctx.finished_at, Some(ctx.started_at)) {
                (Some(finished), Some(started)) => {
                    Some((finished - started).num_milliseconds().max(0))
                }
                _ => None,
            }
        } else {
            None
        };

        let run_error = ctx.run.as_ref().and_then(|r| r.error.as_ref());
        let error_type = run_error.map(classify_run_error);

        let anonymous_id = if ctx.user_id.is_none() {
            Some(format!("anon_{}", &ctx.execution_id.chars().take(8).collect::<String>()))
        } else {
            None
        };

        ExecutionRecord {
            record_type: "track".to_string(),
            event,
            user_id: ctx.user_id.clone(),
            anonymous_id,
            timestamp: Utc::now(),
            message_id: Uuid::new_v4(),
            dimensions: Dimensions {
                execution_mode: ctx.mode.clone(),
                status,
                version: ctx.workflow.version_id.map(|v| v.to_string()),
                environment: None,
                trigger_type,
                workflow_name: ctx.workflow.name.clone(),
                error_type,
            },
            flags: Flags {
                is_manual_execution: ctx.mode == "manual",
                is_retry: ctx.retry_of.is_some(),
            },
            metrics: Metrics {
                node_count: ctx.workflow.nodes.len() as u64,
                duration_ms,
            },
            tags: vec![],
            involves: [
                Involvement::workflow_execution(ctx.execution_id.clone()),
                Involvement::workflow(ctx.workflow.id.clone()),
            ],
            properties: Properties {
                trigger_node: None,
                retry_of: ctx.retry_of.clone(),
                started_at: ctx.started_at,
                finished_at: ctx.finished_at,
                error_message: run_error.map(|e| e.message.clone()),
                error_stack: run_error.and_then(|e| e.stack.clone()),
                error_node_id: run_error.and_then(|e| e.node.as_ref()).map(|n: &ErrorNodeRef| n.id.clone()),
                error_node_name: run_error.and_then(|e| e.node.as_ref()).map(|n: &ErrorNodeRef| n.name.clone()),
                workflow_version: ctx.workflow.version_id.map(|v| v.to_string()),
            },
            context: RecordContext {
                app: AppInfo {
                    name: "n8n".to_string(),
                    version: self.host.app_version.clone(),
                },
                library: LibraryInfo {
                    name: "n8n-kafka-execution-logger".to_string(),
                    version: self.host.library_version.clone(),
                },
                instance: InstanceInfo {
                    id: self.host.instance_id.clone(),
                    instance_type: self.host.instance_type,
                },
                n8n: N8nContext {
                    execution_mode: ctx.mode.clone(),
                    instance_type: self.host.instance_type,
                },
            },
        }
    }

    /// `type=="track"`, non-empty event, at least one of userId/anonymousId.
    pub fn validate(record: &ExecutionRecord) -> bool {
        record.record_type == "track" && record.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use common::{NodeDescriptor, RunSummary};

    fn node(id: &str, name: &str, node_type: &str) -> NodeDescriptor {
        NodeDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            node_type: node_type.to_string(),
        }
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn base_ctx() -> ExecutionContext {
        ExecutionContext {
            execution_id: "exec-456".to_string(),
            workflow: WorkflowDescriptor {
                id: "workflow-123".to_string(),
                name: "Test Workflow".to_string(),
                nodes: vec![node("n1", "Start", "n8n-nodes-base.start"), node("n2", "HTTP Request", "n8n-nodes-base.httpRequest")],
                version_id: Some(1),
            },
            mode: "manual".to_string(),
            user_id: Some("user-789".to_string()),
            retry_of: None,
            started_at: ts("2023-01-01T10:00:00Z"),
            finished_at: None,
            run: None,
        }
    }

    #[test]
    fn s1_start_event_happy_path() {
        let builder = EventBuilder::new(HostInfo::default());
        let record = builder.build(&base_ctx(), LifecycleEventKind::Start);

        assert_eq!(record.event, EventKind::Started);
        assert_eq!(record.dimensions.execution_mode, "manual");
        assert_eq!(record.dimensions.workflow_name, "Test Workflow");
        assert!(record.flags.is_manual_execution);
        assert!(!record.flags.is_retry);
        assert_eq!(record.metrics.node_count, 2);
        assert_eq!(record.properties.workflow_version.as_deref(), Some("1"));
        assert!(EventBuilder::validate(&record));
    }

    #[test]
    fn s2_complete_with_duration() {
        let mut ctx = base_ctx();
        ctx.finished_at = Some(ts("2023-01-01T10:01:30Z"));
        ctx.run = Some(RunSummary {
            status: "success".to_string(),
            error: None,
        });

        let builder = EventBuilder::new(HostInfo::default());
        let record = builder.build(&ctx, LifecycleEventKind::Complete);

        assert_eq!(record.event, EventKind::Completed);
        assert_eq!(record.dimensions.status.as_deref(), Some("success"));
        assert_eq!(record.metrics.duration_ms, Some(90_000));
    }

    #[test]
    fn s3_failure_with_node_error() {
        let mut ctx = base_ctx();
        ctx.run = Some(RunSummary {
            status: "error".to_string(),
            error: Some(RunError {
                name: Some("NodeOperationError".to_string()),
                message: "HTTP request failed".to_string(),
                stack: None,
                node: Some(ErrorNodeRef {
                    id: "node-2".to_string(),
                    name: "HTTP Request".to_string(),
                }),
            }),
        });

        let builder = EventBuilder::new(HostInfo::default());
        let record = builder.build(&ctx, LifecycleEventKind::Fail);

        assert_eq!(record.event, EventKind::Failed);
        assert_eq!(record.dimensions.status.as_deref(), Some("error"));
        assert_eq!(record.dimensions.error_type.as_deref(), Some("NodeOperationError"));
        assert_eq!(record.properties.error_node_id.as_deref(), Some("node-2"));
        assert_eq!(record.properties.error_node_name.as_deref(), Some("HTTP Request"));
    }

    #[test]
    fn canceled_status_normalizes_to_cancelled() {
        let mut ctx = base_ctx();
        ctx.run = Some(RunSummary {
            status: "canceled".to_string(),
            error: None,
        });
        let builder = EventBuilder::new(HostInfo::default());
        let record = builder.build(&ctx, LifecycleEventKind::Cancel);
        assert_eq!(record.dimensions.status.as_deref(), Some("cancelled"));
    }

    #[test]
    fn crashed_status_normalizes_to_error() {
        let mut ctx = base_ctx();
        ctx.run = Some(RunSummary {
            status: "crashed".to_string(),
            error: None,
        });
        let builder = EventBuilder::new(HostInfo::default());
        let record = builder.build(&ctx, LifecycleEventKind::Fail);
        assert_eq!(record.dimensions.status.as_deref(), Some("error"));
    }

    #[test]
    fn no_user_id_derives_anonymous_id_from_execution_id_prefix() {
        let mut ctx = base_ctx();
        ctx.user_id = None;
        let builder = EventBuilder::new(HostInfo::default());
        let record = builder.build(&ctx, LifecycleEventKind::Start);
        assert_eq!(record.anonymous_id.as_deref(), Some("anon_exec-456"));
        assert!(record.user_id.is_none());
        assert!(EventBuilder::validate(&record));
    }

    #[test]
    fn retry_mode_sets_flag_and_property() {
        let mut ctx = base_ctx();
        ctx.mode = "retry".to_string();
        ctx.retry_of = Some("exec-111".to_string());
        let builder = EventBuilder::new(HostInfo::default());
        let record = builder.build(&ctx, LifecycleEventKind::Start);
        assert!(record.flags.is_retry);
        assert_eq!(record.properties.retry_of.as_deref(), Some("exec-111"));
    }

    #[test]
    fn trigger_mode_infers_schedule_from_cron_node() {
        let mut ctx = base_ctx();
        ctx.mode = "trigger".to_string();
        ctx.workflow.nodes = vec![node("n1", "Cron", "n8n-nodes-base.cron")];
        let builder = EventBuilder::new(HostInfo::default());
        let record = builder.build(&ctx, LifecycleEventKind::Start);
        assert_eq!(record.dimensions.trigger_type.as_deref(), Some("schedule"));
    }

    #[test]
    fn substring_error_classification_without_declared_name() {
        let mut ctx = base_ctx();
        ctx.run = Some(RunSummary {
            status: "error".to_string(),
            error: Some(RunError {
                name: None,
                message: "connect ECONNREFUSED 127.0.0.1:9092".to_string(),
                stack: None,
                node: None,
            }),
        });
        let builder = EventBuilder::new(HostInfo::default());
        let record = builder.build(&ctx, LifecycleEventKind::Fail);
        assert_eq!(record.dimensions.error_type.as_deref(), Some("ConnectionRefused"));
    }

    #[test]
    fn duration_is_absent_on_start_events_even_with_finished_at() {
        let mut ctx = base_ctx();
        ctx.finished_at = Some(ts("2023-01-01T10:01:30Z"));
        let builder = EventBuilder::new(HostInfo::default());
        let record = builder.build(&ctx, LifecycleEventKind::Start);
        assert!(record.metrics.duration_ms.is_none());
    }
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use adapter::{EventBus, EventHandler, IntegrationService, LifecycleAdapter, LifecycleHandler, LifecycleRegistry};
use anyhow::Result;
use chrono::Utc;
use common::{
    ConfigLoader, ErrorNodeRef, ExecutionContext, NodeDescriptor, PipelineConfig, RunError,
    RunSummary, WorkflowDescriptor,
};
use pipeline::{EventBuilder, FallbackLog, HostInfo, PipelineService, RdKafkaProducer};
use tracing::{error, info};

/// A stand-in for the host's lifecycle registry and event bus: an in-memory
/// dispatcher, good enough to exercise the adapter end-to-end without a
/// running n8n instance.
#[derive(Default)]
struct FakeHost {
    handlers: Mutex<Vec<(&'static str, LifecycleHandler)>>,
    events: Mutex<Vec<(&'static str, EventHandler)>>,
}

impl FakeHost {
    fn emit_lifecycle(&self, name: &str, ctx: ExecutionContext) {
        for (handler_name, handler) in self.handlers.lock().unwrap().iter() {
            if *handler_name == name {
                handler(ctx.clone());
            }
        }
    }

    fn emit_event(&self, name: &str) {
        for (event_name, handler) in self.events.lock().unwrap().iter() {
            if *event_name == name {
                handler();
            }
        }
    }
}

impl LifecycleRegistry for FakeHost {
    fn add_handler(&self, name: &'static str, handler: LifecycleHandler) {
        self.handlers.lock().unwrap().push((name, handler));
    }
}

impl EventBus for FakeHost {
    fn on(&self, event: &'static str, handler: EventHandler) {
        self.events.lock().unwrap().push((event, handler));
    }
}

fn sample_workflow(id: &str, name: &str) -> WorkflowDescriptor {
    WorkflowDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        nodes: vec![
            NodeDescriptor {
                id: "n1".to_string(),
                name: "Start".to_string(),
                node_type: "n8n-nodes-base.start".to_string(),
            },
            NodeDescriptor {
                id: "n2".to_string(),
                name: "HTTP Request".to_string(),
                node_type: "n8n-nodes-base.httpRequest".to_string(),
            },
        ],
        version_id: Some(3),
    }
}

async fn run_demo_executions(host: &FakeHost) {
    let workflow = sample_workflow("workflow-demo", "Demo Sync Workflow");
    let started_at = Utc::now();
    let execution_id = "exec-demo-1".to_string();

    host.emit_lifecycle(
        "workflowExecuteBefore",
        ExecutionContext {
            execution_id: execution_id.clone(),
            workflow: workflow.clone(),
            mode: "manual".to_string(),
            user_id: Some("demo-user".to_string()),
            retry_of: None,
            started_at,
            finished_at: None,
            run: None,
        },
    );
    info!(execution_id = %execution_id, "emitted workflowExecuteBefore");

    tokio::time::sleep(Duration::from_millis(200)).await;

    host.emit_lifecycle(
        "workflowExecuteAfter",
        ExecutionContext {
            execution_id,
            workflow,
            mode: "manual".to_string(),
            user_id: Some("demo-user".to_string()),
            retry_of: None,
            started_at,
            finished_at: Some(Utc::now()),
            run: Some(RunSummary { status: "success".to_string(), error: None }),
        },
    );
    info!("emitted workflowExecuteAfter (success)");

    tokio::time::sleep(Duration::from_millis(200)).await;

    let failing_workflow = sample_workflow("workflow-demo-2", "Demo Failing Workflow");
    let failed_started = Utc::now();
    let execution_id = "exec-demo-2".to_string();

    host.emit_lifecycle(
        "workflowExecuteBefore",
        ExecutionContext {
            execution_id: execution_id.clone(),
            workflow: failing_workflow.clone(),
            mode: "trigger".to_string(),
            user_id: None,
            retry_of: None,
            started_at: failed_started,
            finished_at: None,
            run: None,
        },
    );

    tokio::time::sleep(Duration::from_millis(200)).await;

    host.emit_lifecycle(
        "workflowExecuteAfter",
        ExecutionContext {
            execution_id,
            workflow: failing_workflow,
            mode: "trigger".to_string(),
            user_id: None,
            retry_of: None,
            started_at: failed_started,
            finished_at: Some(Utc::now()),
            run: Some(RunSummary {
                status: "error".to_string(),
                error: Some(RunError {
                    name: Some("NodeOperationError".to_string()),
                    message: "HTTP request failed with status 500".to_string(),
                    stack: None,
                    node: Some(ErrorNodeRef { id: "n2".to_string(), name: "HTTP Request".to_string() }),
                }),
            }),
        },
    );
    info!("emitted workflowExecuteAfter (error)");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("demo_host=info,adapter=info,pipeline=info")
        .init();

    let mut config = ConfigLoader::load().unwrap_or_else(|e| {
        error!(error = %e, "falling back to default configuration");
        PipelineConfig::default()
    });
    config.enabled = true;

    let producer = RdKafkaProducer::new(config.kafka.clone(), config.timeouts.clone());
    let fallback = FallbackLog::new("./demo-fallback-logs", 5, 10_000_000, false);
    let service = Arc::new(PipelineService::new(config.clone(), Arc::new(producer), fallback)?);

    let host = FakeHost::default();
    let integration = IntegrationService::new(Arc::clone(&service), &config);
    let lifecycle_adapter = LifecycleAdapter::new(Arc::clone(&service), EventBuilder::new(HostInfo::default()));

    integration.bind(&host);
    lifecycle_adapter.bind(&host);

    host.emit_event("server-started");
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::select! {
        _ = run_demo_executions(&host) => {
            info!("demo executions dispatched, waiting for background flush (Ctrl+C to exit)");
            let _ = tokio::signal::ctrl_c().await;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C before demo finished");
        }
    }

    info!("shutting down");
    host.emit_event("shutdown");
    tokio::time::sleep(Duration::from_millis(200)).await;

    Ok(())
}

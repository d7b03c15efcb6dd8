use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use common::{ExecutionContext, LifecycleEventKind};
use pipeline::{EventBuilder, PipelineService};
use tracing::error;

/// A lifecycle callback registered with the host: receives the
/// [`ExecutionContext`] the host has already assembled for the execution in
/// question.
pub type LifecycleHandler = Arc<dyn Fn(ExecutionContext) + Send + Sync>;

/// A bare event callback, used for signals that carry no payload.
pub type EventHandler = Arc<dyn Fn() + Send + Sync>;

/// Host-facing registration surface: `addHandler(name, fn)` for
/// `workflowExecuteBefore`/`workflowExecuteAfter`. The host owns the
/// registry; the adapter only calls into it.
pub trait LifecycleRegistry: Send + Sync {
    fn add_handler(&self, name: &'static str, handler: LifecycleHandler);
}

/// Host-facing subscription surface: `on(event, fn)` for `server-started`/
/// `shutdown`.
pub trait EventBus: Send + Sync {
    fn on(&self, event: &'static str, handler: EventHandler);
}

fn finish_kind(ctx: &ExecutionContext) -> LifecycleEventKind {
    match ctx.run.as_ref().map(|r| r.status.as_str()) {
        Some("success") => LifecycleEventKind::Complete,
        Some("canceled") | Some("cancelled") => LifecycleEventKind::Cancel,
        _ => LifecycleEventKind::Fail,
    }
}

fn dispatch(
    service: Arc<PipelineService>,
    builder: Arc<EventBuilder>,
    ctx: ExecutionContext,
    kind: LifecycleEventKind,
) {
    tokio::spawn(async move {
        let record = match std::panic::catch_unwind(AssertUnwindSafe(|| builder.build(&ctx, kind))) {
            Ok(record) => record,
            Err(_) => {
                error!("panic while building execution record from lifecycle event, dropping it");
                return;
            }
        };
        service.ingest(record).await;
    });
}

/// Registers `workflowExecuteBefore`/`workflowExecuteAfter` handlers on a
/// host lifecycle registry. Every dispatch is fire-and-forget: the handler
/// itself returns immediately, and the record build + ingest happen on a
/// spawned task so the host's execution path never waits on the pipeline.
pub struct LifecycleAdapter {
    service: Arc<PipelineService>,
    builder: Arc<EventBuilder>,
}

impl LifecycleAdapter {
    pub fn new(service: Arc<PipelineService>, builder: EventBuilder) -> Self {
        Self {
            service,
            builder: Arc::new(builder),
        }
    }

    pub fn bind(&self, registry: &dyn LifecycleRegistry) {
        let service = Arc::clone(&self.service);
        let builder = Arc::clone(&self.builder);
        registry.add_handler(
            "workflowExecuteBefore",
            Arc::new(move |ctx| dispatch(Arc::clone(&service), Arc::clone(&builder), ctx, LifecycleEventKind::Start)),
        );

        let service = Arc::clone(&self.service);
        let builder = Arc::clone(&self.builder);
        registry.add_handler(
            "workflowExecuteAfter",
            Arc::new(move |ctx| {
                let kind = finish_kind(&ctx);
                dispatch(Arc::clone(&service), Arc::clone(&builder), ctx, kind);
            }),
        );
    }
}

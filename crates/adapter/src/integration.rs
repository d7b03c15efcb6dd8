use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::PipelineConfig;
use pipeline::PipelineService;
use tracing::warn;

use crate::lifecycle::EventBus;

fn kafka_appears_configured(config: &PipelineConfig) -> bool {
    config.enabled && !config.kafka.brokers.is_empty()
}

/// Binds the pipeline's `initialize`/`shutdown` lifecycle to the host's
/// `server-started`/`shutdown` signals. Gated on Kafka appearing configured;
/// otherwise stays dormant and the host never hears from it again. Repeated
/// signals are absorbed rather than re-running initialize or shutdown twice.
pub struct IntegrationService {
    service: Arc<PipelineService>,
    configured: bool,
    running: Arc<AtomicBool>,
}

impl IntegrationService {
    pub fn new(service: Arc<PipelineService>, config: &PipelineConfig) -> Self {
        Self {
            service,
            configured: kafka_appears_configured(config),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn bind(&self, bus: &dyn EventBus) {
        if !self.configured {
            warn!("kafka not configured (enabled=false or no brokers); integration service stays dormant");
            return;
        }

        let service = Arc::clone(&self.service);
        let running = Arc::clone(&self.running);
        bus.on(
            "server-started",
            Arc::new(move || {
                if running.swap(true, Ordering::SeqCst) {
                    return;
                }
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service.initialize().await;
                });
            }),
        );

        let service = Arc::clone(&self.service);
        let running = Arc::clone(&self.running);
        bus.on(
            "shutdown",
            Arc::new(move || {
                if !running.swap(false, Ordering::SeqCst) {
                    return;
                }
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service.shutdown().await;
                });
            }),
        );
    }
}

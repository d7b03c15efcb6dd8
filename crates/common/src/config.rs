use serde::Deserialize;

use crate::errors::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaAuth {
    pub username: String,
    pub password: String,
    pub mechanism: SaslMechanism,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
    pub topic: String,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub auth: Option<KafkaAuth>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            client_id: "n8n-execution-logger".to_string(),
            topic: "n8n-executions".to_string(),
            ssl: false,
            auth: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub max_size: usize,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            batch_size: 100,
            flush_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub monitoring_period_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            monitoring_period_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    pub connect_ms: u64,
    pub send_ms: u64,
    pub disconnect_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 10_000,
            send_ms: 5_000,
            disconnect_ms: 5_000,
        }
    }
}

/// Validated configuration bundle consumed by the pipeline. The core never
/// sources this itself in production (that's the host's job) but does own
/// the loader used by the demo host and by tests.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kafka: KafkaConfig::default(),
            queue: QueueConfig::default(),
            breaker: BreakerConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

fn looks_like_host_port(broker: &str) -> bool {
    match broker.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

impl PipelineConfig {
    /// Validate every numeric/cardinality rule from the configuration
    /// surface. Called once at `PipelineService::initialize`; a failing
    /// config never reaches the rest of the pipeline.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.kafka.brokers.is_empty() {
            return Err(PipelineError::Configuration(
                "kafka.brokers must contain at least one broker".to_string(),
            ));
        }
        for broker in &self.kafka.brokers {
            if !looks_like_host_port(broker) {
                return Err(PipelineError::Configuration(format!(
                    "invalid broker-format: '{broker}' is not host:port"
                )));
            }
        }
        if self.kafka.client_id.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "kafka.clientId is clientid-empty".to_string(),
            ));
        }
        if self.kafka.topic.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "kafka.topic is topic-empty".to_string(),
            ));
        }

        if self.queue.max_size == 0 {
            return Err(PipelineError::Configuration(
                "queue.maxSize must be greater than zero".to_string(),
            ));
        }
        if self.queue.batch_size == 0 || self.queue.batch_size > self.queue.max_size {
            return Err(PipelineError::Configuration(
                "queue.batchSize must be in (0, maxSize]".to_string(),
            ));
        }
        if self.queue.flush_interval_ms == 0 {
            return Err(PipelineError::Configuration(
                "queue.flushInterval must be greater than zero".to_string(),
            ));
        }

        if self.breaker.failure_threshold == 0 {
            return Err(PipelineError::Configuration(
                "breaker.failureThreshold must be greater than zero".to_string(),
            ));
        }
        if self.breaker.reset_timeout_ms == 0 {
            return Err(PipelineError::Configuration(
                "breaker.resetTimeout must be greater than zero".to_string(),
            ));
        }
        if self.breaker.monitoring_period_ms == 0 {
            return Err(PipelineError::Configuration(
                "breaker.monitoringPeriod must be greater than zero".to_string(),
            ));
        }

        if self.timeouts.connect_ms == 0 || self.timeouts.send_ms == 0 || self.timeouts.disconnect_ms == 0
        {
            return Err(PipelineError::Configuration(
                "timeouts.{connect,send,disconnect} must all be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Loads [`PipelineConfig`] from a layered `config::Config`: an optional
/// `config/default` file overlaid with `N8N_KAFKA__*` environment variables
/// (double underscore nests, matching the `config` crate's convention).
///
/// This is ambient plumbing for the demo host and tests; embedding hosts are
/// free to build a `PipelineConfig` however they already load configuration
/// and hand it to `PipelineService::initialize` directly.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load() -> Result<PipelineConfig, PipelineError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("N8N_KAFKA")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            );

        let built = builder
            .build()
            .map_err(|e| PipelineError::Configuration(format!("missing or invalid config source: {e}")))?;

        built
            .try_deserialize()
            .map_err(|e| PipelineError::Configuration(format!("invalid configuration: {e}")))
    }
}

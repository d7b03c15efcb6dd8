use std::time::Duration;

use async_trait::async_trait;
use common::{ExecutionRecord, KafkaConfig, PipelineError, TimeoutConfig};
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tokio::sync::RwLock;

/// A thin, typed facade over a Kafka producer. Every call is bounded by its
/// configured timeout; the concrete implementation never leaks `rdkafka`
/// types across this boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KafkaProducer: Send + Sync {
    async fn connect(&self) -> Result<(), PipelineError>;
    async fn disconnect(&self);
    async fn send(&self, record: &ExecutionRecord) -> Result<(), PipelineError>;
    async fn send_batch(&self, records: &[ExecutionRecord]) -> Result<(), PipelineError>;
    async fn is_connected(&self) -> bool;
}

/// `rdkafka`-backed implementation. `connect`/`disconnect` are serialized by
/// an internal lock so repeated calls from the breaker's retry path never
/// race each other.
pub struct RdKafkaProducer {
    config: KafkaConfig,
    timeouts: TimeoutConfig,
    client: RwLock<Option<FutureProducer>>,
}

fn classify_kafka_error(err: &KafkaError) -> PipelineError {
    let text = err.to_string();
    let lower = text.to_lowercase();
    if lower.contains("auth") || lower.contains("sasl") {
        PipelineError::Authentication(text)
    } else if lower.contains("timed out") || lower.contains("timeout") {
        PipelineError::Timeout(text)
    } else if lower.contains("broker transport failure")
        || lower.contains("connection")
        || lower.contains("all brokers down")
    {
        PipelineError::Connection(text)
    } else {
        PipelineError::MessageSending(text)
    }
}

impl RdKafkaProducer {
    pub fn new(config: KafkaConfig, timeouts: TimeoutConfig) -> Self {
        Self {
            config,
            timeouts,
            client: RwLock::new(None),
        }
    }

    fn build_client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::new();
        cfg.set("bootstrap.servers", self.config.brokers.join(","))
            .set("client.id", &self.config.client_id)
            .set("message.timeout.ms", self.timeouts.send_ms.to_string())
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("compression.type", "snappy");

        if self.config.ssl {
            cfg.set(
                "security.protocol",
                if self.config.auth.is_some() {
                    "SASL_SSL"
                } else {
                    "SSL"
                },
            );
        } else if self.config.auth.is_some() {
            cfg.set("security.protocol", "SASL_PLAINTEXT");
        }

        if let Some(auth) = &self.config.auth {
            let mechanism = match auth.mechanism {
                common::SaslMechanism::Plain => "PLAIN",
                common::SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
                common::SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
            };
            cfg.set("sasl.mechanism", mechanism)
                .set("sasl.username", &auth.username)
                .set("sasl.password", &auth.password);
        }

        cfg
    }

    fn record_key_and_timestamp(record: &ExecutionRecord) -> (String, i64) {
        (record.message_id.to_string(), record.timestamp.timestamp_millis())
    }
}

#[async_trait]
impl KafkaProducer for RdKafkaProducer {
    async fn connect(&self) -> Result<(), PipelineError> {
        if self.client.read().await.is_some() {
            return Ok(());
        }
        let mut guard = self.client.write().await;
        if guard.is_some() {
            return Ok(());
        }
        let producer: FutureProducer = self
            .build_client_config()
            .create()
            .map_err(|e| classify_kafka_error(&e))?;
        *guard = Some(producer);
        Ok(())
    }

    async fn disconnect(&self) {
        let mut guard = self.client.write().await;
        *guard = None;
    }

    async fn send(&self, record: &ExecutionRecord) -> Result<(), PipelineError> {
        let guard = self.client.read().await;
        let producer = guard
            .as_ref()
            .ok_or_else(|| PipelineError::Connection("producer is not connected".to_string()))?;

        let payload = serde_json::to_string(record)
            .map_err(|e| PipelineError::Serialization(e.to_string()))?;
        let (key, ts) = Self::record_key_and_timestamp(record);

        let future_record = FutureRecord::to(&self.config.topic)
            .key(&key)
            .payload(&payload)
            .timestamp(ts);

        producer
            .send(future_record, Timeout::After(Duration::from_millis(self.timeouts.send_ms)))
            .await
            .map_err(|(e, _)| classify_kafka_error(&e))?;
        Ok(())
    }

    async fn send_batch(&self, records: &[ExecutionRecord]) -> Result<(), PipelineError> {
        if records.is_empty() {
            return Ok(());
        }
        let guard = self.client.read().await;
        let producer = guard
            .as_ref()
            .ok_or_else(|| PipelineError::Connection("producer is not connected".to_string()))?;

        let timeout = Timeout::After(Duration::from_millis(self.timeouts.send_ms));

        let mut encoded = Vec::with_capacity(records.len());
        for record in records {
            let payload = serde_json::to_string(record)
                .map_err(|e| PipelineError::Serialization(e.to_string()))?;
            let (key, ts) = Self::record_key_and_timestamp(record);
            encoded.push((key, payload, ts));
        }

        // `encoded` outlives the futures below: each `FutureRecord` borrows
        // its key/payload, so the buffers must stay alive until `join_all`
        // resolves them.
        let sends = encoded.iter().map(|(key, payload, ts)| {
            let future_record = FutureRecord::to(&self.config.topic)
                .key(key)
                .payload(payload)
                .timestamp(*ts);
            producer.send(future_record, timeout)
        });

        for result in futures::future::join_all(sends).await {
            result.map_err(|(e, _)| classify_kafka_error(&e))?;
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.client.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_sasl_plaintext_when_auth_set_without_ssl() {
        let mut kafka = KafkaConfig::default();
        kafka.auth = Some(common::KafkaAuth {
            username: "u".to_string(),
            password: "p".to_string(),
            mechanism: common::SaslMechanism::ScramSha256,
        });
        let producer = RdKafkaProducer::new(kafka, TimeoutConfig::default());
        let cfg = producer.build_client_config();
        assert_eq!(cfg.get("security.protocol"), Some("SASL_PLAINTEXT"));
        assert_eq!(cfg.get("sasl.mechanism"), Some("SCRAM-SHA-256"));
    }

    #[tokio::test]
    async fn fresh_producer_reports_disconnected() {
        let producer = RdKafkaProducer::new(KafkaConfig::default(), TimeoutConfig::default());
        assert!(!producer.is_connected().await);
    }
}

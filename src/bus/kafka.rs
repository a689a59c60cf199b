//! Kafka writer backed by rdkafka.
//!
//! Requires the `kafka` feature (links librdkafka). Writes wait for the
//! partition leader only (`acks=1`), not the full in-sync replica set.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{info, warn};

use super::error::PublishError;
use super::message::BusMessage;
use super::writer::BusWriter;

/// Long-lived producer handle, reused for every send from this instance.
pub struct KafkaWriter {
    producer: FutureProducer,
}

impl KafkaWriter {
    /// Create a producer for `brokers` (comma separated `host:port` list).
    ///
    /// `message_timeout` bounds how long librdkafka keeps retrying a
    /// queued message before reporting it failed.
    pub fn connect(brokers: &str, message_timeout: Duration) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("acks", "1")
            .set("message.timeout.ms", message_timeout.as_millis().to_string())
            .create()
            .map_err(|e| PublishError::Write(e.to_string()))?;
        info!(brokers, "kafka producer created");
        Ok(Self { producer })
    }

    /// Flush queued messages, waiting at most `timeout`.
    pub fn flush(&self, timeout: Duration) {
        if let Err(err) = self.producer.flush(Timeout::After(timeout)) {
            warn!(error = %err, "kafka flush did not complete");
        }
    }
}

#[async_trait]
impl BusWriter for KafkaWriter {
    async fn write(&self, message: BusMessage) -> Result<(), PublishError> {
        let mut headers = OwnedHeaders::new();
        for (key, value) in &message.headers {
            headers = headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            });
        }

        let mut record = FutureRecord::to(&message.topic)
            .key(message.key.as_str())
            .payload(message.value.as_slice())
            .headers(headers);
        if let Some(partition) = message.partition {
            record = record.partition(partition);
        }

        self.producer
            .send(record, Timeout::Never)
            .await
            .map(|_| ())
            .map_err(|(err, _)| match err {
                KafkaError::MessageProduction(code) => PublishError::Rejected(code.to_string()),
                other => PublishError::Write(other.to_string()),
            })
    }
}

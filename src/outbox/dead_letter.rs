use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::error;

use super::record::OutboxRecord;
use crate::bus::{BusPublisher, BusWriter, PublishError};

/// Destination for records that exhausted their dispatch attempts.
///
/// Once a sink accepts a record, the drainer marks it sent so it stops
/// retrying; the sink is responsible for keeping it.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn dead_letter(&self, record: &OutboxRecord) -> Result<(), PublishError>;
}

/// Logs dead-lettered records at error level, or collects them in a buffer.
pub struct LogDeadLetterSink {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl Default for LogDeadLetterSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogDeadLetterSink {
    pub fn new() -> Self {
        LogDeadLetterSink { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        LogDeadLetterSink {
            buffer: Some(buffer),
        }
    }
}

#[async_trait]
impl DeadLetterSink for LogDeadLetterSink {
    async fn dead_letter(&self, record: &OutboxRecord) -> Result<(), PublishError> {
        let line = format!(
            "[DEAD LETTER] {} sum={} attempts={} last_error={}",
            record.id,
            record.sum,
            record.attempts,
            record.last_error.as_deref().unwrap_or("-"),
        );
        if let Some(buffer) = &self.buffer {
            buffer
                .lock()
                .map_err(|_| PublishError::Write("dead letter buffer poisoned".into()))?
                .push(line);
        } else {
            error!(
                record_id = %record.id,
                sum = record.sum,
                attempts = record.attempts,
                last_error = record.last_error.as_deref().unwrap_or("-"),
                "outbox record dead-lettered"
            );
        }
        Ok(())
    }
}

/// Republishes dead-lettered records to a separate topic, keyed by record id.
pub struct BusDeadLetterSink<W> {
    publisher: BusPublisher<W>,
    deadline: Duration,
}

impl<W: BusWriter> BusDeadLetterSink<W> {
    pub fn new(publisher: BusPublisher<W>, deadline: Duration) -> Self {
        Self { publisher, deadline }
    }
}

#[async_trait]
impl<W: BusWriter + 'static> DeadLetterSink for BusDeadLetterSink<W> {
    async fn dead_letter(&self, record: &OutboxRecord) -> Result<(), PublishError> {
        self.publisher
            .send_keyed(&record.id.to_string(), record.sum, self.deadline)
            .await
            .map(|_| ())
    }
}

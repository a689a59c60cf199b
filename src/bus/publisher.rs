//! Partition-pinned publisher for sum events.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::error::PublishError;
use super::message::{
    format_timestamp, BusMessage, SumEvent, CONTENT_TYPE_HEADER, JSON_CONTENT_TYPE,
    PARTITION_HEADER, TIMESTAMP_HEADER,
};
use super::writer::BusWriter;

/// Where a publisher's messages land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionTarget {
    /// Let the bus client balance across partitions.
    #[default]
    Unassigned,
    /// Every message goes to this partition.
    Fixed(i32),
}

impl PartitionTarget {
    pub fn partition(&self) -> Option<i32> {
        match self {
            PartitionTarget::Unassigned => None,
            PartitionTarget::Fixed(p) => Some(*p),
        }
    }
}

impl fmt::Display for PartitionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionTarget::Unassigned => write!(f, "unassigned"),
            PartitionTarget::Fixed(p) => write!(f, "{}", p),
        }
    }
}

/// What the bus acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub key: String,
    pub partition: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

/// Publishes sum events to one topic through a long-lived `BusWriter`.
///
/// The writer is shared behind an `Arc` and only borrowed by each send, so
/// a send cancelled by its deadline never tears down the connection.
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use sum_outbox::bus::{BusPublisher, InMemoryBus};
///
/// # tokio_test_block(async {
/// let bus = InMemoryBus::new();
/// let publisher = BusPublisher::pinned(bus.clone(), "user-events", 1);
///
/// publisher.send(30, Duration::from_secs(1)).await.unwrap();
/// assert_eq!(bus.messages_on_partition(1).len(), 1);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f);
/// # }
/// ```
pub struct BusPublisher<W> {
    writer: Arc<W>,
    topic: String,
    target: PartitionTarget,
}

impl<W> Clone for BusPublisher<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            topic: self.topic.clone(),
            target: self.target,
        }
    }
}

impl<W: BusWriter> BusPublisher<W> {
    /// Publisher without a partition assignment.
    pub fn new(writer: W, topic: impl Into<String>) -> Self {
        Self::with_target(Arc::new(writer), topic, PartitionTarget::Unassigned)
    }

    /// Publisher that sends everything to `partition`.
    pub fn pinned(writer: W, topic: impl Into<String>, partition: i32) -> Self {
        Self::with_target(Arc::new(writer), topic, PartitionTarget::Fixed(partition))
    }

    /// Publisher over an already shared writer.
    pub fn with_target(writer: Arc<W>, topic: impl Into<String>, target: PartitionTarget) -> Self {
        Self {
            writer,
            topic: topic.into(),
            target,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn target(&self) -> PartitionTarget {
        self.target
    }

    pub fn writer(&self) -> &Arc<W> {
        &self.writer
    }

    /// Publish `sum` under a freshly generated key.
    pub async fn send(&self, sum: i32, deadline: Duration) -> Result<Delivery, PublishError> {
        let key = Uuid::new_v4().to_string();
        self.send_keyed(&key, sum, deadline).await
    }

    /// Publish `sum` under `key`, waiting at most `deadline` for the ack.
    pub async fn send_keyed(
        &self,
        key: &str,
        sum: i32,
        deadline: Duration,
    ) -> Result<Delivery, PublishError> {
        let timestamp = Utc::now();
        let message = self.encode(key, sum, timestamp)?;

        match tokio::time::timeout(deadline, self.writer.write(message)).await {
            Ok(Ok(())) => {
                debug!(topic = %self.topic, key, sum, partition = %self.target, "message sent");
                Ok(Delivery {
                    key: key.to_string(),
                    partition: self.target.partition(),
                    timestamp,
                })
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(PublishError::Timeout(deadline)),
        }
    }

    /// Build the wire message for `sum` without sending it.
    pub fn encode(
        &self,
        key: &str,
        sum: i32,
        timestamp: DateTime<Utc>,
    ) -> Result<BusMessage, PublishError> {
        let value = serde_json::to_vec(&SumEvent::new(sum, timestamp))?;

        let mut headers = vec![
            (CONTENT_TYPE_HEADER.to_string(), JSON_CONTENT_TYPE.to_string()),
            (TIMESTAMP_HEADER.to_string(), format_timestamp(&timestamp)),
        ];
        if let Some(partition) = self.target.partition() {
            headers.push((PARTITION_HEADER.to_string(), partition.to_string()));
        }

        Ok(BusMessage {
            topic: self.topic.clone(),
            key: key.to_string(),
            value,
            headers,
            partition: self.target.partition(),
        })
    }
}

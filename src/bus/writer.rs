use std::sync::Arc;

use async_trait::async_trait;

use super::error::PublishError;
use super::message::BusMessage;

/// Connection to a message bus.
///
/// Implementations might include:
/// - `InMemoryBus` - For testing and single-process scenarios
/// - `KafkaWriter` - For Apache Kafka (requires the `kafka` feature)
///
/// `write` resolves once the bus has acknowledged the message, or fails.
/// Dropping the future must leave the connection usable.
#[async_trait]
pub trait BusWriter: Send + Sync {
    async fn write(&self, message: BusMessage) -> Result<(), PublishError>;
}

#[async_trait]
impl<W: BusWriter + ?Sized> BusWriter for Arc<W> {
    async fn write(&self, message: BusMessage) -> Result<(), PublishError> {
        (**self).write(message).await
    }
}

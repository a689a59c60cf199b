//! Summation service with a transactional outbox.
//!
//! A request handler computes a sum and stages it as an `OutboxRecord`; a
//! background drainer publishes pending records to the message bus on a
//! fixed interval and marks them sent. Delivery is at-least-once.

pub mod bus;
pub mod config;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod outbox;
pub mod partition;
pub mod producer;
pub mod telemetry;
#[cfg(any(feature = "grpc", feature = "http"))]
pub mod transport;

pub use bus::{BusPublisher, BusWriter, InMemoryBus, PartitionTarget, PublishError, SumEvent};
pub use config::{Config, ConfigurationError};
pub use outbox::{
    DrainResult, DrainerConfig, DrainerHandle, DrainerState, InMemoryOutboxStore, OutboxDrainer,
    OutboxRecord, OutboxStore, StorageError,
};
pub use partition::{PartitionAssigner, UnmappedPolicy};
pub use producer::{Durability, ProducerError, SumOutcome, Summation};

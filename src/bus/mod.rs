//! Message bus - publishing sum events
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 BusPublisher (per instance)                 │
//! │  - topic + partition target                                 │
//! │  - send(sum, deadline) / send_keyed(key, sum, deadline)     │
//! │  - JSON body + content-type / timestamp / partition headers │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     BusWriter trait                         │
//! │  write(BusMessage) -> ack or PublishError                   │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                          │
//!                 ▼                          ▼
//!        ┌─────────────────┐       ┌────────────────────┐
//!        │   InMemoryBus   │       │    KafkaWriter     │
//!        │   (included)    │       │ (`kafka` feature)  │
//!        └─────────────────┘       └────────────────────┘
//! ```
//!
//! Delivery is at-least-once: a successful send may not be durable yet, and
//! a failed send may have been committed. Messages carry a key so consumers
//! can deduplicate.

mod error;
mod in_memory;
#[cfg(feature = "kafka")]
mod kafka;
mod message;
mod publisher;
mod writer;

pub use error::PublishError;
pub use in_memory::InMemoryBus;
#[cfg(feature = "kafka")]
pub use kafka::KafkaWriter;
pub use message::{
    format_timestamp, BusMessage, SumEvent, CONTENT_TYPE_HEADER, JSON_CONTENT_TYPE,
    PARTITION_HEADER, TIMESTAMP_HEADER,
};
pub use publisher::{BusPublisher, Delivery, PartitionTarget};
pub use writer::BusWriter;

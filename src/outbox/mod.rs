//! Transactional outbox - durable staging and draining of sum events.
//!
//! The outbox pattern has two distinct phases:
//! 1. **Save phase** - the producer writes an `OutboxRecord` as part of
//!    handling a request (see `producer`)
//! 2. **Drain phase** (`OutboxDrainer`) - a long-lived task publishes pending
//!    records to the bus and marks them sent
//!
//! Stores:
//! - `InMemoryOutboxStore` - For testing and single-process scenarios
//! - `PgOutboxStore` - PostgreSQL via sqlx (requires the `postgres` feature)
//!
//! ## Example
//!
//! ```ignore
//! use sum_outbox::outbox::{InMemoryOutboxStore, OutboxRecord, OutboxStore};
//!
//! let store = InMemoryOutboxStore::new();
//! store.save(&OutboxRecord::new(30)).await?;
//!
//! for record in store.list_pending().await? {
//!     // publish, then
//!     store.mark_sent(record.id, chrono::Utc::now()).await?;
//! }
//! ```

mod dead_letter;
mod drainer;
mod in_memory;
#[cfg(feature = "postgres")]
mod postgres;
mod record;
mod store;

pub use dead_letter::{BusDeadLetterSink, DeadLetterSink, LogDeadLetterSink};
pub use drainer::{
    DrainResult, DrainerConfig, DrainerHandle, DrainerState, DrainerStats, OutboxDrainer,
    DEFAULT_MAX_IN_FLIGHT, DEFAULT_POLL_INTERVAL, DEFAULT_SEND_TIMEOUT,
};
pub use in_memory::InMemoryOutboxStore;
#[cfg(feature = "postgres")]
pub use postgres::PgOutboxStore;
pub use record::OutboxRecord;
pub use store::{OutboxStore, StorageError};

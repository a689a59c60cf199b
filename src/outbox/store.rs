use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::record::OutboxRecord;

/// Failure reading or writing the outbox table.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("outbox store lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("outbox record {0} already exists")]
    Duplicate(Uuid),
    #[error("outbox store unavailable: {0}")]
    Unavailable(String),
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable staging area for records waiting to be published.
///
/// Implementations rely on the backing store's own row-level guarantees;
/// callers add no locking of their own.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Append a new record. The record is pending until `mark_sent` succeeds.
    async fn save(&self, record: &OutboxRecord) -> Result<(), StorageError>;

    /// Every record whose `sent_at` is unset, oldest first.
    async fn list_pending(&self) -> Result<Vec<OutboxRecord>, StorageError>;

    /// Set `sent_at` for a pending record.
    ///
    /// Only the first successful call takes effect. Repeating the call, or
    /// naming an unknown id, succeeds without changing anything.
    async fn mark_sent(&self, id: Uuid, when: DateTime<Utc>) -> Result<(), StorageError>;

    /// Count a failed dispatch attempt and remember the error.
    ///
    /// Returns the new attempt count, or 0 when the id is unknown.
    async fn record_failure(&self, id: Uuid, error: &str) -> Result<u32, StorageError>;
}

#[async_trait]
impl<S: OutboxStore + ?Sized> OutboxStore for Arc<S> {
    async fn save(&self, record: &OutboxRecord) -> Result<(), StorageError> {
        (**self).save(record).await
    }

    async fn list_pending(&self) -> Result<Vec<OutboxRecord>, StorageError> {
        (**self).list_pending().await
    }

    async fn mark_sent(&self, id: Uuid, when: DateTime<Utc>) -> Result<(), StorageError> {
        (**self).mark_sent(id, when).await
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<u32, StorageError> {
        (**self).record_failure(id, error).await
    }
}

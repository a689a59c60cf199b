//! In-memory outbox store for tests and single-process setups.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::record::OutboxRecord;
use super::store::{OutboxStore, StorageError};

/// Thread-safe outbox table kept in a `HashMap`.
///
/// Cloning creates another handle to the same storage, so a producer and a
/// drainer can share one instance the way they would share a pool.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    records: Arc<RwLock<HashMap<Uuid, OutboxRecord>>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a record regardless of its status.
    pub fn get(&self, id: Uuid) -> Result<Option<OutboxRecord>, StorageError> {
        let records = self
            .records
            .read()
            .map_err(|_| StorageError::LockPoisoned("read"))?;
        Ok(records.get(&id).cloned())
    }

    /// All records, pending and sent.
    pub fn all(&self) -> Result<Vec<OutboxRecord>, StorageError> {
        let records = self
            .records
            .read()
            .map_err(|_| StorageError::LockPoisoned("read"))?;
        Ok(records.values().cloned().collect())
    }

    /// Number of records, pending and sent.
    ///
    /// Reads through a poisoned lock: a panicked writer never leaves a
    /// half-inserted entry, so the count is still exact. `get`, `all` and
    /// the `OutboxStore` methods report `LockPoisoned` instead.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn save(&self, record: &OutboxRecord) -> Result<(), StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageError::LockPoisoned("write"))?;
        if records.contains_key(&record.id) {
            return Err(StorageError::Duplicate(record.id));
        }
        let mut stored = record.clone();
        stored.sent_at = None;
        records.insert(stored.id, stored);
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<OutboxRecord>, StorageError> {
        let records = self
            .records
            .read()
            .map_err(|_| StorageError::LockPoisoned("read"))?;
        let mut pending: Vec<OutboxRecord> = records
            .values()
            .filter(|r| r.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        Ok(pending)
    }

    async fn mark_sent(&self, id: Uuid, when: DateTime<Utc>) -> Result<(), StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageError::LockPoisoned("write"))?;
        if let Some(record) = records.get_mut(&id) {
            if record.sent_at.is_none() {
                record.sent_at = Some(when);
            }
        }
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<u32, StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageError::LockPoisoned("write"))?;
        match records.get_mut(&id) {
            Some(record) => {
                record.attempts += 1;
                record.last_error = Some(error.to_string());
                Ok(record.attempts)
            }
            None => Ok(0),
        }
    }
}

//! PostgreSQL-backed outbox store.
//!
//! Requires the `postgres` feature. The pool is shared between the producer
//! and the drainer; `mark_sent` is keyed by primary key and guarded by
//! `sent_at IS NULL`, so concurrent drains of the same record are harmless.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};
use uuid::Uuid;

use super::record::OutboxRecord;
use super::store::{OutboxStore, StorageError};

mod queries {
    pub const CREATE_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS outbox (
            id          UUID PRIMARY KEY,
            sum         INTEGER NOT NULL,
            sent_at     TIMESTAMPTZ NULL,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            attempts    INTEGER NOT NULL DEFAULT 0,
            last_error  TEXT NULL
        )
    "#;

    pub const CREATE_PENDING_INDEX: &str =
        "CREATE INDEX IF NOT EXISTS outbox_pending_idx ON outbox (created_at) WHERE sent_at IS NULL";

    /// Serializes schema bootstrap across instances starting together.
    pub const MIGRATION_LOCK: &str = "SELECT pg_advisory_xact_lock(7235851)";

    pub const SAVE: &str = "INSERT INTO outbox (id, sum, created_at) VALUES ($1, $2, $3)";

    pub const LIST_PENDING: &str = r#"
        SELECT id, sum, sent_at, created_at, attempts, last_error
        FROM outbox
        WHERE sent_at IS NULL
        ORDER BY created_at
    "#;

    pub const MARK_SENT: &str = "UPDATE outbox SET sent_at = $1 WHERE id = $2 AND sent_at IS NULL";

    pub const RECORD_FAILURE: &str = r#"
        UPDATE outbox
        SET attempts = attempts + 1, last_error = $2
        WHERE id = $1
        RETURNING attempts
    "#;
}

#[derive(FromRow)]
struct OutboxRow {
    id: Uuid,
    sum: i32,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    attempts: i32,
    last_error: Option<String>,
}

impl From<OutboxRow> for OutboxRecord {
    fn from(row: OutboxRow) -> Self {
        Self {
            id: row.id,
            sum: row.sum,
            created_at: row.created_at,
            sent_at: row.sent_at,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            last_error: row.last_error,
        }
    }
}

/// Outbox table in PostgreSQL.
#[derive(Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!(max_connections, "connected to outbox database");
        Ok(Self::new(pool))
    }

    /// Create the outbox table and its pending index if they do not exist.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(queries::MIGRATION_LOCK).execute(&mut *tx).await?;
        sqlx::query(queries::CREATE_TABLE).execute(&mut *tx).await?;
        sqlx::query(queries::CREATE_PENDING_INDEX)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn save(&self, record: &OutboxRecord) -> Result<(), StorageError> {
        sqlx::query(queries::SAVE)
            .bind(record.id)
            .bind(record.sum)
            .bind(record.created_at)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                if let sqlx::Error::Database(db) = &err {
                    if db.is_unique_violation() {
                        return StorageError::Duplicate(record.id);
                    }
                }
                StorageError::Database(err)
            })?;
        debug!(record_id = %record.id, sum = record.sum, "outbox record saved");
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<OutboxRecord>, StorageError> {
        let rows: Vec<OutboxRow> = sqlx::query_as(queries::LIST_PENDING)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(OutboxRecord::from).collect())
    }

    async fn mark_sent(&self, id: Uuid, when: DateTime<Utc>) -> Result<(), StorageError> {
        let result = sqlx::query(queries::MARK_SENT)
            .bind(when)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            debug!(record_id = %id, "mark_sent matched no pending record");
        }
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> Result<u32, StorageError> {
        let attempts: Option<i32> = sqlx::query_scalar(queries::RECORD_FAILURE)
            .bind(id)
            .bind(error)
            .fetch_optional(&self.pool)
            .await?;
        Ok(attempts.and_then(|a| u32::try_from(a).ok()).unwrap_or(0))
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A computed sum staged for publication via the outbox pattern.
///
/// `id`, `sum` and `created_at` never change after creation. `sent_at` is
/// written once, by the drainer, when the record has been handed to the bus.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub sum: i32,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Failed dispatch attempts so far.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl OutboxRecord {
    /// Create a pending record with a fresh id.
    pub fn new(sum: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            sum,
            created_at: Utc::now(),
            sent_at: None,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.sent_at.is_none()
    }
}

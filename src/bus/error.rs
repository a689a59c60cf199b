use std::time::Duration;

use thiserror::Error;

/// Failure handing a message to the bus.
///
/// A failed send is ambiguous: the broker may still have committed the
/// write. Callers retry and rely on consumers deduplicating by key.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("bus write failed: {0}")]
    Write(String),
    #[error("bus rejected message: {0}")]
    Rejected(String),
    #[error("no acknowledgment within {0:?}")]
    Timeout(Duration),
}

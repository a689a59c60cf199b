//! Summation handler - computes a sum and stages it in the outbox.
//!
//! Publication is asynchronous: `calculate` returns once the record is
//! saved, and the drainer publishes it later.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::metrics::OutboxMetrics;
use crate::outbox::{OutboxRecord, OutboxStore, StorageError};

/// How a failed outbox write affects the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Fail the call when the record could not be saved.
    #[default]
    Required,
    /// Log the failure and return the sum anyway.
    BestEffort,
}

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("sum of {a} and {b} overflows a 32-bit integer")]
    Overflow { a: i32, b: i32 },
    #[error("result was computed but not queued for publication: {0}")]
    NotQueued(#[from] StorageError),
}

/// Result handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SumOutcome {
    pub result: i32,
    /// Id of the staged outbox record, when it was saved.
    pub record_id: Option<Uuid>,
}

impl SumOutcome {
    pub fn queued(&self) -> bool {
        self.record_id.is_some()
    }
}

pub struct Summation<S> {
    store: Arc<S>,
    durability: Durability,
    #[cfg(feature = "metrics")]
    metrics: Option<OutboxMetrics>,
}

impl<S> Clone for Summation<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            durability: self.durability,
            #[cfg(feature = "metrics")]
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: OutboxStore> Summation<S> {
    pub fn new(store: Arc<S>, durability: Durability) -> Self {
        Self {
            store,
            durability,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Count returned sums and failed saves in `metrics`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: OutboxMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    /// Add `a` and `b` and stage the result for publication.
    pub async fn calculate(&self, a: i32, b: i32) -> Result<SumOutcome, ProducerError> {
        let result = a.checked_add(b).ok_or(ProducerError::Overflow { a, b })?;
        debug!(a, b, result, "sum computed");

        let record = OutboxRecord::new(result);
        let saved = self.store.save(&record).await;
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            match &saved {
                Ok(()) => metrics.record_sum(),
                Err(_) if self.durability == Durability::BestEffort => {
                    metrics.record_save_failure();
                    metrics.record_sum();
                }
                Err(_) => metrics.record_save_failure(),
            }
        }

        match saved {
            Ok(()) => Ok(SumOutcome {
                result,
                record_id: Some(record.id),
            }),
            Err(err) => match self.durability {
                Durability::Required => Err(ProducerError::NotQueued(err)),
                Durability::BestEffort => {
                    warn!(error = %err, result, "failed to save result to outbox, returning it unqueued");
                    Ok(SumOutcome {
                        result,
                        record_id: None,
                    })
                }
            },
        }
    }
}

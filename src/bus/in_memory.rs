//! In-memory bus for testing and single-process scenarios.
//!
//! `InMemoryBus` implements `BusWriter` by appending to a shared log, and
//! lets tests simulate the failures a real broker produces:
//! - an outage (`set_available(false)`)
//! - slow acknowledgments (`set_latency`)
//! - rejection of specific messages (`reject_when`)

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use super::error::PublishError;
use super::message::BusMessage;
use super::writer::BusWriter;

type RejectFn = dyn Fn(&BusMessage) -> bool + Send + Sync;

/// In-memory bus log.
///
/// Thread-safe; cloning shares the same log and fault settings.
///
/// ## Example
///
/// ```
/// use sum_outbox::bus::{BusMessage, BusWriter, InMemoryBus};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let bus = InMemoryBus::new();
/// bus.write(BusMessage {
///     topic: "user-events".into(),
///     key: "k-1".into(),
///     value: br#"{"sum":3,"timestamp":"2024-01-01T00:00:00Z"}"#.to_vec(),
///     headers: Vec::new(),
///     partition: Some(0),
/// })
/// .await
/// .unwrap();
///
/// assert_eq!(bus.len(), 1);
/// assert_eq!(bus.messages_on_partition(0)[0].key, "k-1");
/// # });
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    /// Acknowledged messages, in write order
    log: Arc<RwLock<Vec<BusMessage>>>,
    /// Every write attempt, including failed ones
    attempts: Arc<AtomicUsize>,
    available: Arc<AtomicBool>,
    latency: Arc<Mutex<Duration>>,
    reject: Arc<RwLock<Option<Arc<RejectFn>>>>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            log: Arc::new(RwLock::new(Vec::new())),
            attempts: Arc::new(AtomicUsize::new(0)),
            available: Arc::new(AtomicBool::new(true)),
            latency: Arc::new(Mutex::new(Duration::ZERO)),
            reject: Arc::new(RwLock::new(None)),
        }
    }

    /// Get all acknowledged messages.
    ///
    /// The inspection helpers read through a poisoned log lock; only
    /// `write` reports the poisoning as an error.
    pub fn messages(&self) -> Vec<BusMessage> {
        self.log.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Messages written to one partition.
    pub fn messages_on_partition(&self, partition: i32) -> Vec<BusMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.partition == Some(partition))
            .collect()
    }

    /// Find an acknowledged message by key.
    pub fn find_by_key(&self, key: &str) -> Option<BusMessage> {
        self.messages().into_iter().find(|m| m.key == key)
    }

    /// Count acknowledged messages carrying `key`.
    pub fn count_key(&self, key: &str) -> usize {
        self.messages().iter().filter(|m| m.key == key).count()
    }

    pub fn len(&self) -> usize {
        self.log.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of writes attempted, successful or not.
    pub fn write_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Simulate a broker outage.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay every acknowledgment by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut current) = self.latency.lock() {
            *current = latency;
        }
    }

    /// Reject any message for which `predicate` returns true.
    pub fn reject_when<F>(&self, predicate: F)
    where
        F: Fn(&BusMessage) -> bool + Send + Sync + 'static,
    {
        if let Ok(mut reject) = self.reject.write() {
            *reject = Some(Arc::new(predicate));
        }
    }

    /// Stop rejecting messages.
    pub fn accept_all(&self) {
        if let Ok(mut reject) = self.reject.write() {
            *reject = None;
        }
    }

    /// Clear the log and fault settings (useful for test cleanup).
    pub fn clear(&self) {
        if let Ok(mut log) = self.log.write() {
            log.clear();
        }
        self.attempts.store(0, Ordering::SeqCst);
        self.set_available(true);
        self.set_latency(Duration::ZERO);
        self.accept_all();
    }
}

#[async_trait]
impl BusWriter for InMemoryBus {
    async fn write(&self, message: BusMessage) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let latency = self
            .latency
            .lock()
            .map(|l| *l)
            .map_err(|_| PublishError::Write("latency lock poisoned".into()))?;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(PublishError::Write("bus unavailable".into()));
        }

        let rejected = self
            .reject
            .read()
            .map_err(|_| PublishError::Write("reject lock poisoned".into()))?
            .as_ref()
            .map(|predicate| predicate(&message))
            .unwrap_or(false);
        if rejected {
            return Err(PublishError::Rejected(format!("key {}", message.key)));
        }

        self.log
            .write()
            .map_err(|_| PublishError::Write("log lock poisoned".into()))?
            .push(message);
        Ok(())
    }
}

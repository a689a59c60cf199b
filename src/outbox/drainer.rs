//! Outbox drainer - polls the outbox and publishes pending records.
//!
//! Each tick reads every pending record and dispatches them concurrently,
//! bounded by `max_in_flight`. A record is marked sent only after the bus
//! acknowledged it; any failure leaves it pending for the next tick, so
//! delivery is at-least-once and consumers deduplicate on the message key
//! (the record id).
//!
//! ```text
//! Idle ──tick──▶ Polling ──pending──▶ Dispatching ──done──▶ Idle
//!   ▲               │                                        │
//!   └── empty / ────┘                                        │
//!       storage error                                        │
//! cancel (between ticks) ──▶ Stopped ◀───────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dead_letter::DeadLetterSink;
use super::record::OutboxRecord;
use super::store::{OutboxStore, StorageError};
use crate::bus::{BusPublisher, BusWriter};
#[cfg(feature = "metrics")]
use crate::metrics::OutboxMetrics;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Drainer tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainerConfig {
    /// Time between ticks.
    pub poll_interval: Duration,
    /// Deadline for each bus send.
    pub send_timeout: Duration,
    /// Maximum concurrent dispatches within one tick.
    pub max_in_flight: usize,
}

impl Default for DrainerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainerState {
    Idle,
    Polling,
    Dispatching,
    Stopped,
}

/// Result of a single drain tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainResult {
    /// Records found pending at the start of the tick.
    pub pending: usize,
    /// Sent and marked.
    pub published: usize,
    /// Send (or dead-letter hand-off) failed; still pending.
    pub publish_failed: usize,
    /// Sent but not marked; still pending and will be sent again.
    pub mark_failed: usize,
    /// Handed to the dead-letter sink and marked.
    pub dead_lettered: usize,
}

/// Statistics from a drainer task.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainerStats {
    pub ticks: usize,
    pub poll_errors: usize,
    pub published: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

impl DrainerStats {
    fn absorb(&mut self, result: DrainResult) {
        self.published += result.published;
        self.failed += result.publish_failed + result.mark_failed;
        self.dead_lettered += result.dead_lettered;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Published,
    PublishFailed,
    MarkFailed,
    DeadLettered,
}

#[derive(Clone)]
struct DeadLetterPolicy {
    sink: Arc<dyn DeadLetterSink>,
    max_attempts: u32,
}

/// Everything one dispatch task needs, cloned per record.
struct Dispatch<S, W> {
    store: Arc<S>,
    publisher: BusPublisher<W>,
    dead_letter: Option<DeadLetterPolicy>,
    send_timeout: Duration,
}

impl<S: OutboxStore, W: BusWriter> Dispatch<S, W> {
    async fn run(self, record: OutboxRecord) -> Outcome {
        if let Some(policy) = &self.dead_letter {
            if record.attempts >= policy.max_attempts {
                return self.hand_off(&policy.sink, record).await;
            }
        }

        let key = record.id.to_string();
        if let Err(err) = self
            .publisher
            .send_keyed(&key, record.sum, self.send_timeout)
            .await
        {
            warn!(record_id = %record.id, error = %err, "publish failed, record stays pending");
            if let Err(store_err) = self.store.record_failure(record.id, &err.to_string()).await {
                warn!(record_id = %record.id, error = %store_err, "could not record dispatch failure");
            }
            return Outcome::PublishFailed;
        }

        self.mark(&record, Outcome::Published).await
    }

    async fn hand_off(&self, sink: &Arc<dyn DeadLetterSink>, record: OutboxRecord) -> Outcome {
        match sink.dead_letter(&record).await {
            Ok(()) => self.mark(&record, Outcome::DeadLettered).await,
            Err(err) => {
                error!(record_id = %record.id, error = %err, "dead-letter hand-off failed, record stays pending");
                Outcome::PublishFailed
            }
        }
    }

    async fn mark(&self, record: &OutboxRecord, success: Outcome) -> Outcome {
        match self.store.mark_sent(record.id, Utc::now()).await {
            Ok(()) => {
                debug!(record_id = %record.id, "outbox record marked sent");
                success
            }
            Err(err) => {
                warn!(
                    record_id = %record.id,
                    error = %err,
                    "record published but not marked sent, it will be published again"
                );
                Outcome::MarkFailed
            }
        }
    }
}

/// Drains an outbox store into a bus publisher.
///
/// ## Example
///
/// ```ignore
/// use std::sync::Arc;
/// use sum_outbox::bus::{BusPublisher, InMemoryBus};
/// use sum_outbox::outbox::{DrainerConfig, InMemoryOutboxStore, OutboxDrainer};
/// use tokio_util::sync::CancellationToken;
///
/// let store = Arc::new(InMemoryOutboxStore::new());
/// let publisher = BusPublisher::pinned(InMemoryBus::new(), "user-events", 1);
///
/// let handle = OutboxDrainer::new(store, publisher, DrainerConfig::default())
///     .spawn(CancellationToken::new());
///
/// // ... producer saves records ...
///
/// let stats = handle.stop().await;
/// println!("Published {} records", stats.published);
/// ```
pub struct OutboxDrainer<S, W> {
    store: Arc<S>,
    publisher: BusPublisher<W>,
    config: DrainerConfig,
    dead_letter: Option<DeadLetterPolicy>,
    state: watch::Sender<DrainerState>,
    #[cfg(feature = "metrics")]
    metrics: Option<OutboxMetrics>,
}

impl<S, W> OutboxDrainer<S, W>
where
    S: OutboxStore + 'static,
    W: BusWriter + 'static,
{
    pub fn new(store: Arc<S>, publisher: BusPublisher<W>, config: DrainerConfig) -> Self {
        let (state, _) = watch::channel(DrainerState::Idle);
        Self {
            store,
            publisher,
            config,
            dead_letter: None,
            state,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Hand records to `sink` once they have failed `max_attempts` times.
    ///
    /// Without this, a record that can never be published is retried
    /// forever. Every record gets at least one send to the main topic, so
    /// a `max_attempts` of 0 is treated as 1.
    pub fn with_dead_letter(mut self, sink: Arc<dyn DeadLetterSink>, max_attempts: u32) -> Self {
        if max_attempts == 0 {
            warn!("dead-letter max_attempts of 0 raised to 1");
        }
        self.dead_letter = Some(DeadLetterPolicy {
            sink,
            max_attempts: max_attempts.max(1),
        });
        self
    }

    /// Count every tick and poll error in `metrics`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: OutboxMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &DrainerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn publisher(&self) -> &BusPublisher<W> {
        &self.publisher
    }

    pub fn state(&self) -> DrainerState {
        *self.state.borrow()
    }

    fn set_state(&self, state: DrainerState) {
        self.state.send_replace(state);
    }

    fn dispatch(&self) -> Dispatch<S, W> {
        Dispatch {
            store: Arc::clone(&self.store),
            publisher: self.publisher.clone(),
            dead_letter: self.dead_letter.clone(),
            send_timeout: self.config.send_timeout,
        }
    }

    /// Run one tick: read every pending record and dispatch it.
    ///
    /// Returns after all dispatches of this tick finished. Only a failure to
    /// list pending records is an error; per-record failures are counted in
    /// the result and leave the record pending.
    pub async fn drain_once(&self) -> Result<DrainResult, StorageError> {
        let outcome = self.poll_and_dispatch().await;
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            match &outcome {
                Ok(result) => metrics.record_tick(result),
                Err(_) => metrics.record_poll_error(),
            }
        }
        outcome
    }

    async fn poll_and_dispatch(&self) -> Result<DrainResult, StorageError> {
        self.set_state(DrainerState::Polling);
        let pending = match self.store.list_pending().await {
            Ok(pending) => pending,
            Err(err) => {
                self.set_state(DrainerState::Idle);
                return Err(err);
            }
        };

        let mut result = DrainResult {
            pending: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            self.set_state(DrainerState::Idle);
            return Ok(result);
        }

        info!(pending = pending.len(), "draining outbox");
        self.set_state(DrainerState::Dispatching);

        let limiter = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();
        for record in pending {
            let Ok(permit) = Arc::clone(&limiter).acquire_owned().await else {
                break;
            };
            let dispatch = self.dispatch();
            tasks.spawn(async move {
                let outcome = dispatch.run(record).await;
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Outcome::Published) => result.published += 1,
                Ok(Outcome::PublishFailed) => result.publish_failed += 1,
                Ok(Outcome::MarkFailed) => result.mark_failed += 1,
                Ok(Outcome::DeadLettered) => result.dead_lettered += 1,
                Err(err) => {
                    error!(error = %err, "dispatch task aborted");
                    result.publish_failed += 1;
                }
            }
        }

        self.set_state(DrainerState::Idle);
        info!(
            published = result.published,
            publish_failed = result.publish_failed,
            mark_failed = result.mark_failed,
            dead_lettered = result.dead_lettered,
            "outbox tick complete"
        );
        Ok(result)
    }

    /// Tick until `cancel` fires. Cancellation is observed between ticks.
    pub async fn run(self, cancel: CancellationToken) -> DrainerStats {
        let interval = if self.config.poll_interval.is_zero() {
            warn!(default = ?DEFAULT_POLL_INTERVAL, "invalid poll interval, using default");
            DEFAULT_POLL_INTERVAL
        } else {
            self.config.poll_interval
        };

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats = DrainerStats::default();

        info!(
            interval = ?interval,
            topic = self.publisher.topic(),
            partition = %self.publisher.target(),
            "outbox drainer started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    stats.ticks += 1;
                    match self.drain_once().await {
                        Ok(result) => stats.absorb(result),
                        Err(err) => {
                            stats.poll_errors += 1;
                            error!(error = %err, "failed to read pending outbox records");
                        }
                    }
                }
            }
        }

        self.set_state(DrainerState::Stopped);
        info!(published = stats.published, ticks = stats.ticks, "outbox drainer stopped");
        stats
    }

    /// Run the drainer on its own task.
    pub fn spawn(self, cancel: CancellationToken) -> DrainerHandle {
        let state = self.state.subscribe();
        let token = cancel.clone();
        let join = tokio::spawn(self.run(token));
        DrainerHandle {
            cancel,
            join: Some(join),
            state,
        }
    }
}

/// Handle to a spawned drainer.
///
/// Dropping the handle signals the drainer to stop without waiting.
pub struct DrainerHandle {
    cancel: CancellationToken,
    join: Option<JoinHandle<DrainerStats>>,
    state: watch::Receiver<DrainerState>,
}

impl DrainerHandle {
    pub fn state(&self) -> DrainerState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<DrainerState> {
        self.state.clone()
    }

    /// Signal the drainer to stop without waiting.
    pub fn signal_stop(&self) {
        self.cancel.cancel();
    }

    /// Signal the drainer to stop and wait for the current tick to finish.
    /// Returns the drainer statistics.
    pub async fn stop(mut self) -> DrainerStats {
        self.cancel.cancel();
        match self.join.take() {
            Some(join) => match join.await {
                Ok(stats) => stats,
                Err(err) => {
                    error!(error = %err, "outbox drainer task did not finish cleanly");
                    DrainerStats::default()
                }
            },
            None => DrainerStats::default(),
        }
    }
}

impl Drop for DrainerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

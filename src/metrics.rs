//! Prometheus metrics for the outbox.
//!
//! Requires the `metrics` feature. `OutboxMetrics` owns its own `Registry`;
//! the drainer and the producer update it, and `router` serves it in the
//! Prometheus text format next to a plain `/health` check.
//!
//! All names follow `summation_<component>_<metric>`.
//!
//! ## Example
//!
//! ```ignore
//! let metrics = OutboxMetrics::new()?;
//! let drainer = OutboxDrainer::new(store.clone(), publisher, config).with_metrics(metrics.clone());
//! let summation = Summation::new(store, Durability::Required).with_metrics(metrics.clone());
//!
//! sum_outbox::metrics::serve(sum_outbox::metrics::router(metrics), "0.0.0.0:9091", shutdown).await?;
//! ```

use std::future::Future;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use tracing::{error, info};

use crate::outbox::DrainResult;
use crate::telemetry::TelemetryError;

/// Counters updated by the drainer and the producer.
///
/// Cloning shares the underlying counters.
#[derive(Clone)]
pub struct OutboxMetrics {
    registry: Registry,
    ticks: IntCounter,
    poll_errors: IntCounter,
    pending: IntGauge,
    published: IntCounter,
    publish_failed: IntCounter,
    mark_failed: IntCounter,
    dead_lettered: IntCounter,
    sums: IntCounter,
    save_failures: IntCounter,
}

impl OutboxMetrics {
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();

        let ticks = counter(&registry, "summation_drainer_ticks_total", "Drain ticks run")?;
        let poll_errors = counter(
            &registry,
            "summation_drainer_poll_errors_total",
            "Ticks that could not list pending records",
        )?;
        let pending = IntGauge::new(
            "summation_outbox_pending",
            "Pending records seen at the start of the last tick",
        )
        .map_err(metrics_error)?;
        registry
            .register(Box::new(pending.clone()))
            .map_err(metrics_error)?;
        let published = counter(
            &registry,
            "summation_outbox_published_total",
            "Records published and marked sent",
        )?;
        let publish_failed = counter(
            &registry,
            "summation_outbox_publish_failed_total",
            "Dispatches whose send failed; the record stays pending",
        )?;
        let mark_failed = counter(
            &registry,
            "summation_outbox_mark_failed_total",
            "Records sent but not marked; they will be sent again",
        )?;
        let dead_lettered = counter(
            &registry,
            "summation_outbox_dead_lettered_total",
            "Records handed to the dead-letter sink",
        )?;
        let sums = counter(&registry, "summation_producer_sums_total", "Sums returned to callers")?;
        let save_failures = counter(
            &registry,
            "summation_producer_save_failures_total",
            "Sums whose outbox record could not be saved",
        )?;

        Ok(Self {
            registry,
            ticks,
            poll_errors,
            pending,
            published,
            publish_failed,
            mark_failed,
            dead_lettered,
            sums,
            save_failures,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Fold one completed tick into the counters.
    pub fn record_tick(&self, result: &DrainResult) {
        self.ticks.inc();
        self.pending.set(result.pending as i64);
        self.published.inc_by(result.published as u64);
        self.publish_failed.inc_by(result.publish_failed as u64);
        self.mark_failed.inc_by(result.mark_failed as u64);
        self.dead_lettered.inc_by(result.dead_lettered as u64);
    }

    pub fn record_poll_error(&self) {
        self.ticks.inc();
        self.poll_errors.inc();
    }

    pub fn record_sum(&self) {
        self.sums.inc();
    }

    pub fn record_save_failure(&self) {
        self.save_failures.inc();
    }

    pub fn published(&self) -> u64 {
        self.published.get()
    }

    pub fn failed(&self) -> u64 {
        self.publish_failed.get() + self.mark_failed.get()
    }

    pub fn dead_lettered(&self) -> u64 {
        self.dead_lettered.get()
    }

    pub fn poll_errors(&self) -> u64 {
        self.poll_errors.get()
    }

    pub fn sums(&self) -> u64 {
        self.sums.get()
    }

    /// Render every metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, TelemetryError> {
    let counter = IntCounter::new(name, help).map_err(metrics_error)?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(metrics_error)?;
    Ok(counter)
}

fn metrics_error(err: prometheus::Error) -> TelemetryError {
    TelemetryError::Metrics(err.to_string())
}

/// `GET /metrics` and `GET /health`.
pub fn router(metrics: OutboxMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(|| async { "OK" }))
        .with_state(metrics)
}

/// Serve `app` at `addr` until `shutdown` resolves.
pub async fn serve<F>(app: Router, addr: &str, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "metrics server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn metrics_handler(State(metrics): State<OutboxMetrics>) -> Response {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

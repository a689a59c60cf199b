//! HTTP gateway for the summation service.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `POST /sum`: body `{ "a": 1, "b": 2 }`, returns `{ "result", "service_id", "timestamp" }`
//!   and an `X-Service-ID` header.
//! - `GET /health`: returns `{ "ok": true, "service_id": ... }`.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sum_outbox::outbox::InMemoryOutboxStore;
//! use sum_outbox::producer::{Durability, Summation};
//! use sum_outbox::transport::http;
//!
//! let summation = Summation::new(Arc::new(InMemoryOutboxStore::new()), Durability::Required);
//!
//! // Get the router to compose with other axum routes
//! let app = http::router(summation, "service-a-1");
//!
//! // Or serve directly
//! http::serve(app, "0.0.0.0:8080", std::future::pending()).await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::bus::format_timestamp;
use crate::outbox::OutboxStore;
use crate::producer::{ProducerError, Summation};

pub const SERVICE_ID_HEADER: &str = "x-service-id";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SumRequest {
    pub a: i32,
    pub b: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SumResponse {
    pub result: i32,
    pub service_id: String,
    pub timestamp: String,
}

struct GatewayState<S> {
    summation: Summation<S>,
    service_id: String,
}

/// Build an axum `Router` serving the summation routes.
pub fn router<S: OutboxStore + 'static>(
    summation: Summation<S>,
    service_id: impl Into<String>,
) -> Router {
    let state = Arc::new(GatewayState {
        summation,
        service_id: service_id.into(),
    });
    Router::new()
        .route("/health", get(health_handler))
        .route("/sum", post(sum_handler))
        .with_state(state)
}

/// Serve `app` at `addr` until `shutdown` resolves.
pub async fn serve<F>(app: Router, addr: &str, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "http gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

/// `GET /health`
async fn health_handler<S: OutboxStore + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
) -> impl IntoResponse {
    Json(json!({ "ok": true, "service_id": state.service_id }))
}

/// `POST /sum`
async fn sum_handler<S: OutboxStore + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
    Json(input): Json<SumRequest>,
) -> Response {
    let headers = [(SERVICE_ID_HEADER, state.service_id.clone())];
    match state.summation.calculate(input.a, input.b).await {
        Ok(outcome) => {
            let body = SumResponse {
                result: outcome.result,
                service_id: state.service_id.clone(),
                timestamp: format_timestamp(&Utc::now()),
            };
            (StatusCode::OK, headers, Json(body)).into_response()
        }
        Err(err) => {
            warn!(a = input.a, b = input.b, error = %err, "sum request failed");
            let status = match err {
                ProducerError::Overflow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                ProducerError::NotQueued(_) => StatusCode::SERVICE_UNAVAILABLE,
            };
            let body = json!({ "error": err.to_string(), "service_id": state.service_id });
            (status, headers, Json(body)).into_response()
        }
    }
}

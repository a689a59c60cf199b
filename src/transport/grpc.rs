//! gRPC transport for the summation service.
//!
//! Requires the `grpc` feature. Uses tonic for the server and prost for
//! message serialization (standard protobuf wire format, no `.proto` file).
//!
//! ## RPCs
//!
//! - `CalculateSum`: input `SummationRequest`, output `SummationResponse`.
//!   The result is returned once it is staged in the outbox.
//! - `Health`: liveness check.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sum_outbox::outbox::InMemoryOutboxStore;
//! use sum_outbox::producer::{Durability, Summation};
//! use sum_outbox::transport::grpc;
//!
//! let summation = Summation::new(Arc::new(InMemoryOutboxStore::new()), Durability::Required);
//!
//! // Get the server to compose with other tonic routes
//! let svc = grpc::grpc_server(summation.clone(), "service-a-1");
//!
//! // Or serve directly
//! let addr = "[::1]:50051".parse()?;
//! grpc::serve_grpc(summation, "service-a-1", addr, std::future::pending()).await?;
//! ```

use std::future::Future;
use std::net::SocketAddr;

use tonic::metadata::AsciiMetadataValue;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::outbox::OutboxStore;
use crate::producer::{ProducerError, Summation};

// ---------------------------------------------------------------------------
// Message types (prost, standard protobuf wire format)
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct SummationRequest {
    #[prost(int32, tag = "1")]
    pub a: i32,
    #[prost(int32, tag = "2")]
    pub b: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SummationResponse {
    #[prost(int32, tag = "1")]
    pub result: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HealthRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HealthResponse {
    #[prost(bool, tag = "1")]
    pub ok: bool,
    #[prost(string, tag = "2")]
    pub service_id: String,
}

// ---------------------------------------------------------------------------
// Generated service trait + server/client
// ---------------------------------------------------------------------------

include!(concat!(env!("OUT_DIR"), "/summation.SummationService.rs"));

pub use summation_service_client::SummationServiceClient;
pub use summation_service_server::{SummationService, SummationServiceServer};

/// Response metadata key carrying the instance identity.
pub const SERVICE_ID_METADATA: &str = "x-service-id";

// ---------------------------------------------------------------------------
// Handler implementation
// ---------------------------------------------------------------------------

/// Implements the generated `SummationService` trait on top of `Summation<S>`.
pub struct GrpcHandler<S> {
    summation: Summation<S>,
    service_id: String,
}

impl<S> GrpcHandler<S> {
    pub fn new(summation: Summation<S>, service_id: impl Into<String>) -> Self {
        Self {
            summation,
            service_id: service_id.into(),
        }
    }
}

#[tonic::async_trait]
impl<S: OutboxStore + 'static> SummationService for GrpcHandler<S> {
    async fn calculate_sum(
        &self,
        request: Request<SummationRequest>,
    ) -> Result<Response<SummationResponse>, Status> {
        let req = request.into_inner();
        info!(a = req.a, b = req.b, "CalculateSum");

        let outcome = self
            .summation
            .calculate(req.a, req.b)
            .await
            .map_err(|err| {
                warn!(a = req.a, b = req.b, error = %err, "CalculateSum failed");
                status_for(&err)
            })?;

        let mut response = Response::new(SummationResponse {
            result: outcome.result,
        });
        if let Ok(value) = AsciiMetadataValue::try_from(self.service_id.as_str()) {
            response.metadata_mut().insert(SERVICE_ID_METADATA, value);
        }
        Ok(response)
    }

    async fn health(
        &self,
        _request: Request<HealthRequest>,
    ) -> Result<Response<HealthResponse>, Status> {
        Ok(Response::new(HealthResponse {
            ok: true,
            service_id: self.service_id.clone(),
        }))
    }
}

fn status_for(err: &ProducerError) -> Status {
    match err {
        ProducerError::Overflow { .. } => Status::invalid_argument(err.to_string()),
        ProducerError::NotQueued(_) => Status::unavailable(err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Convenience constructors
// ---------------------------------------------------------------------------

pub fn grpc_server<S: OutboxStore + 'static>(
    summation: Summation<S>,
    service_id: impl Into<String>,
) -> SummationServiceServer<GrpcHandler<S>> {
    SummationServiceServer::new(GrpcHandler::new(summation, service_id))
}

/// Bind and serve the gRPC transport at `addr` until `shutdown` resolves.
pub async fn serve_grpc<S, F>(
    summation: Summation<S>,
    service_id: impl Into<String>,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(), tonic::transport::Error>
where
    S: OutboxStore + 'static,
    F: Future<Output = ()>,
{
    info!(%addr, "grpc server listening");
    tonic::transport::Server::builder()
        .add_service(grpc_server(summation, service_id))
        .serve_with_shutdown(addr, shutdown)
        .await
}

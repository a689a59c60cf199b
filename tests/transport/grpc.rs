//! gRPC transport tests.
//!
//! Starts a tonic server and exercises it with the generated client.

use std::sync::Arc;

use sum_outbox::outbox::{InMemoryOutboxStore, OutboxStore};
use sum_outbox::producer::{Durability, Summation};
use sum_outbox::transport::grpc::{
    self, HealthRequest, SummationRequest, SummationServiceClient,
};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;

use crate::support::{DownStore, SERVICE_ID};

/// Bind to port 0, spawn the gRPC server, and return a connected client.
async fn start_server<S: OutboxStore + 'static>(
    summation: Summation<S>,
) -> SummationServiceClient<tonic::transport::Channel> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let svc = grpc::grpc_server(summation, SERVICE_ID);
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(svc)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    SummationServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap()
}

#[tokio::test]
async fn health_check() {
    let store = Arc::new(InMemoryOutboxStore::new());
    let mut client = start_server(Summation::new(store, Durability::Required)).await;

    let resp = client.health(HealthRequest {}).await.unwrap().into_inner();

    assert!(resp.ok);
    assert_eq!(resp.service_id, SERVICE_ID);
}

#[tokio::test]
async fn calculate_sum() {
    let store = Arc::new(InMemoryOutboxStore::new());
    let mut client = start_server(Summation::new(store.clone(), Durability::Required)).await;

    let resp = client
        .calculate_sum(SummationRequest { a: 10, b: 20 })
        .await
        .unwrap();

    assert_eq!(
        resp.metadata().get("x-service-id").unwrap().to_str().unwrap(),
        SERVICE_ID
    );
    assert_eq!(resp.into_inner().result, 30);
    assert_eq!(store.list_pending().await.unwrap()[0].sum, 30);
}

#[tokio::test]
async fn overflow_is_invalid_argument() {
    let store = Arc::new(InMemoryOutboxStore::new());
    let mut client = start_server(Summation::new(store, Durability::Required)).await;

    let status = client
        .calculate_sum(SummationRequest { a: i32::MIN, b: -1 })
        .await
        .unwrap_err();

    assert_eq!(status.code(), tonic::Code::InvalidArgument);
}

#[tokio::test]
async fn storage_outage_is_unavailable() {
    let mut client = start_server(Summation::new(Arc::new(DownStore), Durability::Required)).await;

    let status = client
        .calculate_sum(SummationRequest { a: 1, b: 2 })
        .await
        .unwrap_err();

    assert_eq!(status.code(), tonic::Code::Unavailable);
    assert!(status.message().contains("not queued"));
}

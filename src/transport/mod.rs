//! Request transports for the summation handler.
//!
//! - `grpc` - tonic server (requires the `grpc` feature)
//! - `http` - axum gateway (requires the `http` feature)

#[cfg(feature = "grpc")]
pub mod grpc;
#[cfg(feature = "http")]
pub mod http;

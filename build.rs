fn main() {
    // Only run gRPC codegen when the "grpc" feature is enabled.
    // Cargo sets CARGO_FEATURE_GRPC when compiling with --features grpc.
    if std::env::var("CARGO_FEATURE_GRPC").is_ok() {
        let service = tonic_build::manual::Service::builder()
            .name("SummationService")
            .package("summation")
            .method(
                tonic_build::manual::Method::builder()
                    .name("calculate_sum")
                    .route_name("CalculateSum")
                    .input_type("crate::transport::grpc::SummationRequest")
                    .output_type("crate::transport::grpc::SummationResponse")
                    .codec_path("tonic::codec::ProstCodec")
                    .build(),
            )
            .method(
                tonic_build::manual::Method::builder()
                    .name("health")
                    .route_name("Health")
                    .input_type("crate::transport::grpc::HealthRequest")
                    .output_type("crate::transport::grpc::HealthResponse")
                    .codec_path("tonic::codec::ProstCodec")
                    .build(),
            )
            .build();

        tonic_build::manual::Builder::new().compile(&[service]);
    }
}

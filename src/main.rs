use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sum_outbox::bus::{BusPublisher, KafkaWriter, PartitionTarget};
use sum_outbox::config::Config;
use sum_outbox::metrics::{self, OutboxMetrics};
use sum_outbox::outbox::{BusDeadLetterSink, OutboxDrainer, PgOutboxStore};
use sum_outbox::partition::local_identity;
use sum_outbox::producer::Summation;
use sum_outbox::telemetry::init_tracing;
use sum_outbox::transport::{grpc, http};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SUMMATION_CONFIG").ok())
        .map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("loading configuration")?;
    init_tracing(&config.log)?;

    let identity = match &config.service.instance_id {
        Some(id) => id.clone(),
        None => local_identity()?,
    };
    let partition = config.partition_assigner().assign(&identity)?;
    info!(identity = %identity, partition, topic = %config.bus.topic, "starting summation service");

    let store = Arc::new(
        PgOutboxStore::connect(&config.database.url, config.database.max_connections)
            .await
            .context("connecting to postgres")?,
    );
    store.migrate().await.context("creating outbox table")?;

    let writer = Arc::new(
        KafkaWriter::connect(&config.bus.brokers, config.bus.message_timeout())
            .context("creating kafka producer")?,
    );
    let target = PartitionTarget::Fixed(partition);
    let publisher = BusPublisher::with_target(writer.clone(), config.bus.topic.clone(), target);

    let metrics = OutboxMetrics::new()?;
    let mut drainer = OutboxDrainer::new(store.clone(), publisher, config.drainer_config())
        .with_metrics(metrics.clone());
    match (&config.bus.dead_letter_topic, config.drainer.max_attempts) {
        (Some(topic), Some(max_attempts)) => {
            let dlq = BusPublisher::with_target(writer.clone(), topic.clone(), target);
            let sink = BusDeadLetterSink::new(dlq, config.bus.send_timeout());
            drainer = drainer.with_dead_letter(Arc::new(sink), max_attempts);
            info!(topic = %topic, max_attempts, "dead-lettering enabled");
        }
        (Some(topic), None) => {
            warn!(topic = %topic, "dead_letter_topic set without drainer.max_attempts, records retry forever");
        }
        _ => {}
    }

    let cancel = CancellationToken::new();
    let drainer = drainer.spawn(cancel.clone());

    let signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                signal.cancel();
            }
            Err(err) => error!(error = %err, "failed to listen for shutdown signal"),
        }
    });

    let summation =
        Summation::new(store, config.service.durability).with_metrics(metrics.clone());
    let grpc_addr: SocketAddr = config
        .service
        .grpc_addr
        .parse()
        .with_context(|| format!("invalid grpc address {:?}", config.service.grpc_addr))?;
    let app = http::router(summation.clone(), identity.clone());

    // Any server exiting brings the whole process down.
    let (grpc_result, http_result, metrics_result) = tokio::join!(
        async {
            let token = cancel.clone();
            let result = grpc::serve_grpc(summation, identity.clone(), grpc_addr, async move {
                token.cancelled().await
            })
            .await;
            cancel.cancel();
            result
        },
        async {
            let token = cancel.clone();
            let result = http::serve(app, &config.service.http_addr, async move {
                token.cancelled().await
            })
            .await;
            cancel.cancel();
            result
        },
        async {
            let token = cancel.clone();
            let result = metrics::serve(
                metrics::router(metrics.clone()),
                &config.service.metrics_addr,
                async move { token.cancelled().await },
            )
            .await;
            cancel.cancel();
            result
        },
    );

    let stats = drainer.stop().await;
    info!(
        ticks = stats.ticks,
        published = stats.published,
        failed = stats.failed,
        dead_lettered = stats.dead_lettered,
        "outbox drainer stopped"
    );
    writer.flush(config.bus.message_timeout());

    grpc_result.context("grpc server")?;
    http_result.context("http gateway")?;
    metrics_result.context("metrics server")?;
    Ok(())
}

use actix::prelude::*;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use printshop_orders::actors::{CoordinatorActor, Shutdown};
use printshop_orders::config::{BroadcastBackend, Config};
use printshop_orders::db::Database;
use printshop_orders::messaging::{Broadcaster, LocalBroadcaster, RedisBroadcaster};
use printshop_orders::metrics::{self, Metrics};
use printshop_orders::outbox::OutboxRelay;
use printshop_orders::printer::{OctoPrintClient, PrintDispatcher};

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,printshop_orders=debug"))
        )
        .init();

    tracing::info!("🚀 Starting printshop order relay");

    let config = Config::load()?;

    // === 1. Database ===
    let db = Database::connect(&config.database).await?;
    db.migrate().await?;

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    if config.metrics.enabled {
        let registry = Arc::new(metrics.registry().clone());
        let port = config.metrics.port;
        actix::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(registry, port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    }

    // === 3. External side-effect targets (each behind a circuit breaker) ===
    let printer: Arc<dyn PrintDispatcher> = Arc::new(OctoPrintClient::new(&config.printer)?);
    tracing::info!(base_url = %config.printer.base_url, file = %config.printer.job_file, "Printer configured");

    let broadcaster: Arc<dyn Broadcaster> = match config.broadcast.backend {
        BroadcastBackend::Redis => {
            tracing::info!(redis_url = %config.broadcast.redis_url, group = %config.broadcast.group, "Broadcasting through Redis");
            Arc::new(RedisBroadcaster::new(&config.broadcast)?)
        }
        BroadcastBackend::Local => {
            tracing::warn!("Local broadcast bus selected; only listeners inside this process receive delivery messages");
            Arc::new(LocalBroadcaster::new(config.broadcast.local_capacity))
        }
    };

    // === 4. Outbox relay ===
    let relay = Arc::new(
        OutboxRelay::new(db.outbox(), printer, broadcaster, config.broadcast.group.clone(), config.relay.clone())
            .with_metrics(metrics.clone()),
    );

    let pending = relay.pending_count().await?;
    if pending > 0 {
        tracing::info!(pending = pending, "📬 Delivering events left from a previous run");
    }

    // === 5. Actors ===
    let coordinator = CoordinatorActor::new(relay.clone()).start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, shutting down");

    if let Err(e) = coordinator.send(Shutdown).await? {
        tracing::error!("Coordinator shutdown failed: {}", e);
    }

    // one last pass so nothing committed just before shutdown waits for the next start
    match relay.drain().await {
        Ok(report) => tracing::info!(dispatched = report.dispatched, failed = report.failed, "Final outbox pass done"),
        Err(e) => tracing::error!(error = %e, "Final outbox pass failed"),
    }

    db.close().await;
    tracing::info!("👋 Shutdown complete");

    Ok(())
}

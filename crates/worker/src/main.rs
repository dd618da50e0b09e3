use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use fynelo_queue::{DynQueueStore, QueueClient, QueueConfig, RedisQueueStore};
use fynelo_worker::{
    cleanup, server, HealthReporter, PlaceholderEnrichment, SearchWorker, ShutdownOutcome,
    WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fynelo_observability::init();

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;

    let store: DynQueueStore = Arc::new(
        RedisQueueStore::new(config.redis.url()).context("invalid redis configuration")?,
    );
    let client = Arc::new(QueueClient::with_config(
        store,
        QueueConfig::default().with_dequeue_timeout(config.dequeue_timeout),
    ));

    let startup = client.clone();
    tokio::task::spawn_blocking(move || startup.ping())
        .await?
        .context("queue broker unreachable at startup")?;
    info!(host = %config.redis.host, port = config.redis.port, "connected to queue broker");

    let worker = SearchWorker::new(
        client.clone(),
        PlaceholderEnrichment::with_delay(config.processing_delay),
    )
    .with_retry_policy(config.retry.clone())
    .spawn()
    .context("failed to spawn search worker")?;

    let sweeper = cleanup::spawn(client.clone(), config.cleanup_interval)
        .context("failed to spawn cleanup thread")?;

    let reporter = HealthReporter::new(client).with_processing(worker.counters());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.health_port))
        .await
        .with_context(|| format!("failed to bind health port {}", config.health_port))?;
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let health = tokio::spawn(server::serve(
        listener,
        Arc::new(reporter),
        async move {
            let _ = stop_rx.await;
        },
    ));

    shutdown_signal().await;
    info!("shutdown requested");

    let budget = config.shutdown_timeout;
    let counters = worker.counters();
    match tokio::task::spawn_blocking(move || worker.shutdown(budget)).await? {
        ShutdownOutcome::Drained => info!(stats = ?counters.snapshot(), "search worker drained"),
        ShutdownOutcome::TimedOut => {
            warn!(budget_secs = budget.as_secs(), "search worker shutdown timed out")
        }
    }
    tokio::task::spawn_blocking(move || sweeper.shutdown()).await?;

    let _ = stop_tx.send(());
    health.await?.context("health server failed")?;

    info!("worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

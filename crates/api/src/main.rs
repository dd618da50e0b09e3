use std::sync::Arc;

use anyhow::Context;

use fynelo_api::config::ApiConfig;
use fynelo_queue::{DynQueueStore, QueueClient, RedisQueueStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fynelo_observability::init();

    let config = ApiConfig::from_env().context("invalid api configuration")?;

    let store: DynQueueStore = Arc::new(
        RedisQueueStore::new(config.redis.url()).context("invalid redis configuration")?,
    );
    let client = Arc::new(QueueClient::new(store));

    let startup = client.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || startup.ping()).await? {
        // Job routes answer 503 until the broker comes back.
        tracing::warn!(error = %e, "queue broker unreachable at startup");
    }

    let app = fynelo_api::app::build_app(client);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

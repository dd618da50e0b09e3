//! Health HTTP server (`/healthz`, `/stats`).

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower::ServiceBuilder;
use tracing::info;

use fynelo_queue::QueueStore;

use crate::health::{HealthReport, HealthReporter};

/// Build the health router over `reporter`.
pub fn router<S: QueueStore + 'static>(reporter: Arc<HealthReporter<S>>) -> Router {
    Router::new()
        .route("/healthz", get(healthz::<S>))
        .route("/stats", get(stats::<S>))
        .layer(ServiceBuilder::new().layer(Extension(reporter)))
}

/// Serve the health router until `shutdown` resolves.
pub async fn serve<S, F>(
    listener: tokio::net::TcpListener,
    reporter: Arc<HealthReporter<S>>,
    shutdown: F,
) -> std::io::Result<()>
where
    S: QueueStore + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "health server listening");
    axum::serve(listener, router(reporter))
        .with_graceful_shutdown(shutdown)
        .await
}

// Checks hit the broker synchronously; keep them off the async runtime.
async fn healthz<S: QueueStore + 'static>(
    Extension(reporter): Extension<Arc<HealthReporter<S>>>,
) -> Response {
    let report = tokio::task::spawn_blocking(move || reporter.check())
        .await
        .unwrap_or_else(|e| HealthReport::unhealthy(format!("health check failed: {e}")));

    let code = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report)).into_response()
}

async fn stats<S: QueueStore + 'static>(
    Extension(reporter): Extension<Arc<HealthReporter<S>>>,
) -> Response {
    match tokio::task::spawn_blocking(move || reporter.stats()).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(HealthReport::unhealthy(format!("stats collection failed: {e}"))),
        )
            .into_response(),
    }
}

//! HTTP API application wiring (Axum router + shared queue client).
//!
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: response bodies
//! - `errors.rs`: consistent error responses

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use fynelo_queue::SharedQueueClient;

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(client: SharedQueueClient) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/jobs", routes::jobs::router())
        .layer(ServiceBuilder::new().layer(Extension(client)))
}

//! Background search worker.
//!
//! - `worker`: dequeue loop with retry/backoff and graceful shutdown
//! - `operation`: the enrichment step and its failure classification
//! - `health` / `server`: broker health and queue stats over HTTP
//! - `cleanup`: periodic sweep of expired job records

pub mod cleanup;
pub mod config;
pub mod health;
pub mod operation;
pub mod retry;
pub mod server;
pub mod worker;

pub use config::WorkerConfig;
pub use health::{HealthReport, HealthReporter, HealthStatus, WorkerStats};
pub use operation::{OperationError, OperationErrorKind, PlaceholderEnrichment, SearchOperation};
pub use retry::RetryPolicy;
pub use worker::{ProcessingCounters, ProcessingStats, SearchWorker, ShutdownOutcome, WorkerHandle};

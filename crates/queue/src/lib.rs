//! Durable search-job queue.
//!
//! ## Design
//!
//! - Jobs are plain JSON records keyed by a sequential id (`search_<n>`)
//! - Strict FIFO with destructive blocking pop; at-least-once delivery
//! - Status only moves forward: pending → processing → completed | failed
//! - Every record and per-user index expires after 24 hours
//!
//! ## Components
//!
//! - `SearchJob`: the job record and its transitions
//! - `QueueStore`: broker primitives (Redis or in-memory)
//! - `QueueClient`: enqueue / dequeue / status / listing / cleanup
//! - `EnrichmentProducer`: trigger policy used by the search API

pub mod client;
pub mod config;
pub mod job;
pub mod producer;
pub mod store;

pub use client::{QueueClient, QueueConfig, QueueError};
pub use config::{ConfigError, RedisConfig};
pub use job::{
    JobPriority, JobStatus, JobTransition, NewSearchJob, QueuedJob, SearchFilters, SearchJob,
    DEFAULT_MAX_RETRIES, JOB_LIFETIME,
};
pub use producer::{EnrichmentProducer, SearchRequest};
pub use store::{InMemoryQueueStore, QueueStore, StoreError};
#[cfg(feature = "redis")]
pub use store::RedisQueueStore;

/// Type-erased store handle used where the backend is picked at runtime.
pub type DynQueueStore = std::sync::Arc<dyn QueueStore>;

/// Queue client over a runtime-selected store, shared across components.
pub type SharedQueueClient = std::sync::Arc<QueueClient<DynQueueStore>>;

//! Queue store boundary.
//!
//! The client speaks job semantics; stores speak broker primitives (counters,
//! expiring values, FIFO lists, sets). Redis is the production store, the
//! in-memory store backs tests and local development.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod r#trait;

pub use in_memory::InMemoryQueueStore;
#[cfg(feature = "redis")]
pub use redis::RedisQueueStore;
pub use r#trait::{QueueStore, StoreError};

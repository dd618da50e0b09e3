use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Broker primitives the queue client is built on.
///
/// Every call is a single command against one key; nothing here is
/// transactional. Lists are FIFO: `push` appends at the tail and
/// `pop_blocking` removes from the head.
pub trait QueueStore: Send + Sync {
    /// Atomically increment an integer counter and return the new value.
    fn incr(&self, key: &str) -> Result<u64, StoreError>;

    /// Store a value, replacing any previous one, expiring after `ttl`.
    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Read a value. `None` if the key is absent or expired.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove a key. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Append to the tail of a list, returning the new length.
    fn push(&self, list: &str, value: &str) -> Result<u64, StoreError>;

    /// Remove and return the head of a list, waiting up to `timeout` for one.
    fn pop_blocking(&self, list: &str, timeout: Duration) -> Result<Option<String>, StoreError>;

    fn list_len(&self, list: &str) -> Result<u64, StoreError>;

    /// Add a member to a set (no-op if already present).
    fn set_add(&self, set: &str, member: &str) -> Result<(), StoreError>;

    fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError>;

    /// (Re)arm the expiry of an existing key.
    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// All live keys starting with `prefix`.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    fn ping(&self) -> Result<(), StoreError>;
}

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The broker could not be reached (connection refused, dropped, timed out).
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    /// The broker answered but rejected the command.
    #[error("store command failed: {0}")]
    Command(String),
}

impl<S: QueueStore + ?Sized> QueueStore for Arc<S> {
    fn incr(&self, key: &str) -> Result<u64, StoreError> {
        (**self).incr(key)
    }

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).set_with_ttl(key, value, ttl)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        (**self).delete(key)
    }

    fn push(&self, list: &str, value: &str) -> Result<u64, StoreError> {
        (**self).push(list, value)
    }

    fn pop_blocking(&self, list: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        (**self).pop_blocking(list, timeout)
    }

    fn list_len(&self, list: &str) -> Result<u64, StoreError> {
        (**self).list_len(list)
    }

    fn set_add(&self, set: &str, member: &str) -> Result<(), StoreError> {
        (**self).set_add(set, member)
    }

    fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        (**self).set_members(set)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).expire(key, ttl)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).keys_with_prefix(prefix)
    }

    fn ping(&self) -> Result<(), StoreError> {
        (**self).ping()
    }
}

//! Redis-backed queue store.
//!
//! Lists map to `LPUSH`/`BRPOP` (push on the left, pop on the right), which
//! gives FIFO order. Values are plain strings written with `SET .. EX`.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use super::r#trait::{QueueStore, StoreError};

/// `SCAN` page size used when listing keys.
const SCAN_COUNT: u64 = 200;

#[derive(Debug, Clone)]
pub struct RedisQueueStore {
    client: Arc<redis::Client>,
}

impl RedisQueueStore {
    /// Create a store for the given connection URL (e.g. `redis://localhost:6379/0`).
    ///
    /// Does not connect; the first command (or [`QueueStore::ping`]) does.
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    fn connection(&self) -> Result<redis::Connection, StoreError> {
        self.client.get_connection().map_err(map_redis_error)
    }
}

fn map_redis_error(e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
    {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}

// Redis expiries are whole seconds; a zero TTL would be rejected.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl QueueStore for RedisQueueStore {
    fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection()?;
        redis::cmd("INCR")
            .arg(key)
            .query(&mut conn)
            .map_err(map_redis_error)
    }

    #[instrument(skip(self, value), err)]
    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query(&mut conn)
            .map_err(map_redis_error)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection()?;
        redis::cmd("GET")
            .arg(key)
            .query(&mut conn)
            .map_err(map_redis_error)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection()?;
        let removed: u64 = redis::cmd("DEL")
            .arg(key)
            .query(&mut conn)
            .map_err(map_redis_error)?;
        Ok(removed > 0)
    }

    fn push(&self, list: &str, value: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection()?;
        redis::cmd("LPUSH")
            .arg(list)
            .arg(value)
            .query(&mut conn)
            .map_err(map_redis_error)
    }

    fn pop_blocking(&self, list: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection()?;
        // BRPOP replies nil on timeout, otherwise [list, value].
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(list)
            .arg(ttl_secs(timeout))
            .query(&mut conn)
            .map_err(map_redis_error)?;
        Ok(popped.map(|(_, value)| value))
    }

    fn list_len(&self, list: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection()?;
        redis::cmd("LLEN")
            .arg(list)
            .query(&mut conn)
            .map_err(map_redis_error)
    }

    fn set_add(&self, set: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let _: u64 = redis::cmd("SADD")
            .arg(set)
            .arg(member)
            .query(&mut conn)
            .map_err(map_redis_error)?;
        Ok(())
    }

    fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection()?;
        redis::cmd("SMEMBERS")
            .arg(set)
            .query(&mut conn)
            .map_err(map_redis_error)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let _: u64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs(ttl))
            .query(&mut conn)
            .map_err(map_redis_error)?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection()?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        // SCAN instead of KEYS so a large keyspace does not block the broker.
        loop {
            let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query(&mut conn)
                .map_err(map_redis_error)?;
            keys.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("PING")
            .query(&mut conn)
            .map_err(map_redis_error)?;
        Ok(())
    }
}

//! Worker process configuration.

use std::time::Duration;

use fynelo_queue::config::parse_or;
use fynelo_queue::{ConfigError, RedisConfig};

use crate::cleanup::DEFAULT_CLEANUP_INTERVAL;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis: RedisConfig,
    pub health_port: u16,
    pub dequeue_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub cleanup_interval: Duration,
    /// Sleep inside the placeholder enrichment operation
    pub processing_delay: Duration,
    pub retry: RetryPolicy,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_attempts = parse_or(&lookup, "WORKER_MAX_RETRIES", 3u32)?;
        if max_attempts == 0 {
            return Err(ConfigError::invalid("WORKER_MAX_RETRIES", "must be at least 1"));
        }
        let base_ms = parse_or(&lookup, "WORKER_BASE_BACKOFF_MS", 1_000u64)?;
        let max_ms = parse_or(&lookup, "WORKER_MAX_BACKOFF_MS", 10_000u64)?;
        if max_ms < base_ms {
            return Err(ConfigError::invalid(
                "WORKER_MAX_BACKOFF_MS",
                "must not be below WORKER_BASE_BACKOFF_MS",
            ));
        }

        Ok(Self {
            redis: RedisConfig::from_lookup(&lookup)?,
            health_port: parse_or(&lookup, "WORKER_HEALTH_PORT", 8081)?,
            dequeue_timeout: secs(parse_or(&lookup, "WORKER_DEQUEUE_TIMEOUT_SECS", 5)?),
            shutdown_timeout: secs(parse_or(&lookup, "WORKER_SHUTDOWN_TIMEOUT_SECS", 30)?),
            cleanup_interval: secs(parse_or(
                &lookup,
                "WORKER_CLEANUP_INTERVAL_SECS",
                DEFAULT_CLEANUP_INTERVAL.as_secs(),
            )?),
            processing_delay: Duration::from_millis(parse_or(
                &lookup,
                "WORKER_PROCESSING_DELAY_MS",
                2_000,
            )?),
            retry: RetryPolicy::exponential(
                max_attempts,
                Duration::from_millis(base_ms),
                Duration::from_millis(max_ms),
            ),
        })
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

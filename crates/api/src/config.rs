//! API process configuration.

use std::net::SocketAddr;

use fynelo_queue::config::parse_or;
use fynelo_queue::{ConfigError, RedisConfig};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub redis: RedisConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            bind_addr: parse_or(
                &lookup,
                "API_BIND_ADDR",
                SocketAddr::from(([0, 0, 0, 0], 8080)),
            )?,
            redis: RedisConfig::from_lookup(&lookup)?,
        })
    }
}

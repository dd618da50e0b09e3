//! Broker connection settings, read from the environment.

use thiserror::Error;

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    pub fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset or blank.
pub fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string())),
        None => Ok(default),
    }
}

/// Redis connection settings.
///
/// `REDIS_URL` wins when set; otherwise the URL is assembled from
/// `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD` and `REDIS_DB`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
    url_override: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
            url_override: None,
        }
    }
}

impl RedisConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            host: parse_or(&lookup, "REDIS_HOST", defaults.host)?,
            port: parse_or(&lookup, "REDIS_PORT", defaults.port)?,
            password: lookup("REDIS_PASSWORD").filter(|p| !p.is_empty()),
            db: parse_or(&lookup, "REDIS_DB", defaults.db)?,
            url_override: lookup("REDIS_URL").filter(|u| !u.trim().is_empty()),
        })
    }

    /// Connection URL for the configured broker.
    pub fn url(&self) -> String {
        if let Some(url) = &self.url_override {
            return url.clone();
        }
        match &self.password {
            Some(password) => format!(
                "redis://:{password}@{}:{}/{}",
                self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

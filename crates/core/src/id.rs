//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Prefix of every search job identifier (`search_<n>`).
pub const JOB_ID_PREFIX: &str = "search_";

/// Identifier of a search job.
///
/// Opaque to callers; the store assigns it from a sequential counter, so ids
/// produced by one store read `search_1`, `search_2`, ...
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Build the id for the `n`-th job handed out by the counter.
    pub fn from_sequence(n: u64) -> Self {
        Self(format!("{JOB_ID_PREFIX}{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sequence number embedded in the id, if it follows the `search_<n>` shape.
    pub fn sequence(&self) -> Option<u64> {
        self.0.strip_prefix(JOB_ID_PREFIX)?.parse().ok()
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("JobId: empty"));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of the user owning a job.
///
/// Zero is reserved for "unowned" and never wrapped; see [`UserId::from_raw`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    /// Wrap a raw user id. Returns `None` for `0` (unowned).
    pub fn from_raw(raw: u64) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for UserId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for UserId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: u64 = s
            .trim()
            .parse()
            .map_err(|e| DomainError::invalid_id(format!("UserId: {e}")))?;
        Self::from_raw(raw).ok_or_else(|| DomainError::invalid_id("UserId: must be positive"))
    }
}

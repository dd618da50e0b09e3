//! Search job record, its lifecycle, and the transitions the worker applies.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use fynelo_core::{DomainError, DomainResult, JobId, UserId, ValueObject};

/// Lifetime of every job record (and per-user index) in the store.
pub const JOB_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Attempts granted to a job submitted without an explicit `max_retries`.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Job execution status.
///
/// Transitions only move forward: `pending -> processing -> completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up
    Pending,
    /// Dequeued by a worker (covers the whole retry window)
    Processing,
    /// Completed successfully
    Completed,
    /// Exhausted attempts or hit a non-retryable error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job priority.
///
/// Recorded on the job but never consulted by the queue, which is strictly FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum JobPriority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Urgent = 4,
}

impl TryFrom<u8> for JobPriority {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Normal),
            3 => Ok(Self::High),
            4 => Ok(Self::Urgent),
            other => Err(DomainError::validation(format!("unknown job priority {other}"))),
        }
    }
}

impl From<JobPriority> for u8 {
    fn from(value: JobPriority) -> Self {
        value as u8
    }
}

/// Search criteria carried by a job. Immutable once the job is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub founded_min: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub founded_max: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.is_empty())
}

impl SearchFilters {
    /// Whether any of the text criteria that narrow a search is set.
    ///
    /// Founding-year bounds and the record status do not count.
    pub fn has_search_criteria(&self) -> bool {
        non_empty(&self.industry)
            || non_empty(&self.employee_size)
            || non_empty(&self.location)
            || non_empty(&self.funding_stage)
    }
}

impl ValueObject for SearchFilters {
    fn is_empty(&self) -> bool {
        !self.has_search_criteria()
            && !non_empty(&self.status)
            && self.founded_min.is_none()
            && self.founded_max.is_none()
    }
}

/// A job as submitted by a producer, before the store assigns it an id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSearchJob {
    pub user_id: Option<UserId>,
    pub query: String,
    pub filters: SearchFilters,
    pub priority: Option<JobPriority>,
    pub max_retries: Option<u32>,
}

impl NewSearchJob {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Status change applied to a stored job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTransition {
    /// Worker picked the job up.
    Processing,
    /// Operation succeeded after `failed_attempts` failed tries.
    Completed {
        result_count: u64,
        failed_attempts: u32,
    },
    /// Attempts exhausted or the error was not retryable.
    Failed { error: String, failed_attempts: u32 },
}

impl JobTransition {
    pub fn target(&self) -> JobStatus {
        match self {
            JobTransition::Processing => JobStatus::Processing,
            JobTransition::Completed { .. } => JobStatus::Completed,
            JobTransition::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// One unit of background search work and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchJob {
    pub id: JobId,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_owner"
    )]
    pub user_id: Option<UserId>,
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    pub status: JobStatus,
    #[serde(default)]
    pub priority: JobPriority,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub max_retries: u32,
}

// Payloads written by older producers carry `user_id: 0` for unowned jobs.
fn deserialize_owner<'de, D>(deserializer: D) -> Result<Option<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<u64>::deserialize(deserializer)?;
    Ok(raw.and_then(UserId::from_raw))
}

impl SearchJob {
    /// Materialize a submitted job under its store-assigned id.
    ///
    /// Forces `pending`, stamps `created_at`, and fills in the default priority
    /// and attempt budget.
    pub fn create(id: JobId, new: NewSearchJob, now: DateTime<Utc>) -> Self {
        let max_retries = match new.max_retries {
            Some(n) if n > 0 => n,
            _ => DEFAULT_MAX_RETRIES,
        };

        Self {
            id,
            user_id: new.user_id,
            query: new.query,
            filters: new.filters,
            status: JobStatus::Pending,
            priority: new.priority.unwrap_or_default(),
            created_at: now,
            processed_at: None,
            completed_at: None,
            result_count: 0,
            error_msg: None,
            retry_count: 0,
            max_retries,
        }
    }

    /// Attempt budget, falling back to the default for records stored without one.
    pub fn effective_max_retries(&self) -> u32 {
        if self.max_retries == 0 {
            DEFAULT_MAX_RETRIES
        } else {
            self.max_retries
        }
    }

    /// Whether the record is older than `lifetime` at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, lifetime: Duration) -> bool {
        match chrono::Duration::from_std(lifetime) {
            Ok(lifetime) => now.signed_duration_since(self.created_at) > lifetime,
            Err(_) => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now(), JOB_LIFETIME)
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.effective_max_retries()
    }

    fn ensure_transition(&self, next: JobStatus) -> DomainResult<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::invariant(format!(
                "job {} cannot move from {} to {}",
                self.id, self.status, next
            )))
        }
    }

    /// Mark job as picked up by a worker.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_transition(JobStatus::Processing)?;
        self.status = JobStatus::Processing;
        self.processed_at = Some(now);
        Ok(())
    }

    /// Mark job as completed.
    pub fn mark_completed(
        &mut self,
        result_count: u64,
        failed_attempts: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_transition(JobStatus::Completed)?;
        self.status = JobStatus::Completed;
        self.result_count = result_count;
        self.retry_count = self.retry_count.max(failed_attempts);
        self.completed_at = Some(now);
        Ok(())
    }

    /// Mark job as failed.
    pub fn mark_failed(
        &mut self,
        error: impl Into<String>,
        failed_attempts: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_transition(JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.error_msg = Some(error.into());
        self.retry_count = self.retry_count.max(failed_attempts);
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn apply(&mut self, transition: JobTransition, now: DateTime<Utc>) -> DomainResult<()> {
        match transition {
            JobTransition::Processing => self.mark_processing(now),
            JobTransition::Completed {
                result_count,
                failed_attempts,
            } => self.mark_completed(result_count, failed_attempts, now),
            JobTransition::Failed {
                error,
                failed_attempts,
            } => self.mark_failed(error, failed_attempts, now),
        }
    }
}

/// Client-facing handle for a job: id, status and creation time as display text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: String,
}

impl From<&SearchJob> for QueuedJob {
    fn from(job: &SearchJob) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status,
            created_at: job.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

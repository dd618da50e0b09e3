//! The work a search job performs, and how its failures are classified.

use std::time::Duration;

use thiserror::Error;

use fynelo_queue::SearchJob;

/// Failure category of a search operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationErrorKind {
    /// The job payload failed validation
    Validation,
    /// The query cannot be executed as written
    InvalidQuery,
    /// The operation was refused by an upstream
    Unauthorized,
    /// Anything else; worth another attempt
    Transient,
}

impl OperationErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, OperationErrorKind::Transient)
    }

    /// Classify an untyped failure message.
    ///
    /// For collaborators that only report text: a message equal to one of the
    /// known permanent-failure messages is non-retryable, anything else is
    /// transient.
    pub fn from_message(message: &str) -> Self {
        match message {
            "validation failed" => OperationErrorKind::Validation,
            "invalid query" => OperationErrorKind::InvalidQuery,
            "unauthorized" => OperationErrorKind::Unauthorized,
            _ => OperationErrorKind::Transient,
        }
    }
}

/// A failed attempt at a search operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OperationError {
    pub kind: OperationErrorKind,
    pub message: String,
}

impl OperationError {
    pub fn new(kind: OperationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::Transient, message)
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(OperationErrorKind::from_message(&message), message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// The enrichment step run for each dequeued job.
///
/// Returns the number of results found.
pub trait SearchOperation: Send + Sync {
    fn execute(&self, job: &SearchJob) -> Result<u64, OperationError>;
}

impl<F> SearchOperation for F
where
    F: Fn(&SearchJob) -> Result<u64, OperationError> + Send + Sync,
{
    fn execute(&self, job: &SearchJob) -> Result<u64, OperationError> {
        self(job)
    }
}

/// Stand-in enrichment until the real collaborator is wired in.
///
/// Sleeps for `delay`, fails retryably on the query `"fail"`, and otherwise
/// reports a fixed result count.
#[derive(Debug, Clone)]
pub struct PlaceholderEnrichment {
    pub delay: Duration,
    pub result_count: u64,
}

impl Default for PlaceholderEnrichment {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            result_count: 15,
        }
    }
}

impl PlaceholderEnrichment {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }
}

impl SearchOperation for PlaceholderEnrichment {
    fn execute(&self, job: &SearchJob) -> Result<u64, OperationError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        if job.query == "fail" {
            return Err(OperationError::transient("simulated enrichment failure"));
        }
        Ok(self.result_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fynelo_core::JobId;
    use fynelo_queue::NewSearchJob;

    fn job(query: &str) -> SearchJob {
        SearchJob::create(JobId::from_sequence(1), NewSearchJob::new(query), Utc::now())
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(OperationErrorKind::Transient.is_retryable());
        assert!(!OperationErrorKind::Validation.is_retryable());
        assert!(!OperationErrorKind::InvalidQuery.is_retryable());
        assert!(!OperationErrorKind::Unauthorized.is_retryable());
    }

    #[test]
    fn legacy_messages_are_classified_exactly() {
        assert_eq!(
            OperationError::from_message("unauthorized").kind,
            OperationErrorKind::Unauthorized
        );
        assert_eq!(
            OperationError::from_message("validation failed").kind,
            OperationErrorKind::Validation
        );
        assert_eq!(
            OperationError::from_message("invalid query").kind,
            OperationErrorKind::InvalidQuery
        );
        assert!(OperationError::from_message("connection reset").is_retryable());
    }

    #[test]
    fn messages_merely_mentioning_a_legacy_phrase_stay_retryable() {
        for message in [
            "upstream returned Unauthorized, token refresh scheduled",
            "Unauthorized",
            "validation failed: empty query",
            "retrying after invalid query cache miss",
        ] {
            let err = OperationError::from_message(message);
            assert_eq!(err.kind, OperationErrorKind::Transient, "{message}");
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn placeholder_fails_on_fail_query() {
        let op = PlaceholderEnrichment::with_delay(Duration::ZERO);
        let err = op.execute(&job("fail")).unwrap_err();
        assert!(err.is_retryable());
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn placeholder_reports_fixed_count() {
        let op = PlaceholderEnrichment::with_delay(Duration::ZERO);
        assert_eq!(op.execute(&job("fintech")).unwrap(), 15);
    }
}

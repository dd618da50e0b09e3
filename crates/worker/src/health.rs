//! Broker health and queue statistics for operators.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use fynelo_queue::{QueueClient, QueueStore};

use crate::worker::{ProcessingCounters, ProcessingStats};

/// Reported when the queue depth could not be read.
pub const UNKNOWN_QUEUE_LENGTH: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStats {
    pub status: HealthStatus,
    /// Jobs waiting in the queue, or `-1` when the depth could not be read
    pub queue_length: i64,
    pub broker_available: bool,
    /// Jobs handled by this process, when a worker loop is attached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing: Option<ProcessingStats>,
    pub timestamp: DateTime<Utc>,
}

/// Answers health and stats requests from the queue client.
#[derive(Debug)]
pub struct HealthReporter<S> {
    client: Arc<QueueClient<S>>,
    counters: Option<ProcessingCounters>,
}

impl<S: QueueStore> HealthReporter<S> {
    pub fn new(client: Arc<QueueClient<S>>) -> Self {
        Self {
            client,
            counters: None,
        }
    }

    /// Include the worker loop's counters in stats.
    pub fn with_processing(mut self, counters: ProcessingCounters) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Healthy iff the broker answers a ping.
    pub fn check(&self) -> HealthReport {
        match self.client.ping() {
            Ok(()) => HealthReport {
                status: HealthStatus::Healthy,
                error: None,
                timestamp: Utc::now(),
            },
            Err(e) => HealthReport::unhealthy(format!("queue broker not available: {e}")),
        }
    }

    pub fn stats(&self) -> WorkerStats {
        let broker_available = self.client.ping().is_ok();
        let queue_length = self
            .client
            .get_queue_length()
            .ok()
            .and_then(|n| i64::try_from(n).ok())
            .unwrap_or(UNKNOWN_QUEUE_LENGTH);

        WorkerStats {
            status: if broker_available {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            queue_length,
            broker_available,
            processing: self.counters.as_ref().map(ProcessingCounters::snapshot),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fynelo_queue::{InMemoryQueueStore, NewSearchJob};

    fn reporter() -> (
        Arc<InMemoryQueueStore>,
        Arc<QueueClient<Arc<InMemoryQueueStore>>>,
        HealthReporter<Arc<InMemoryQueueStore>>,
    ) {
        let store = InMemoryQueueStore::arc();
        let client = Arc::new(QueueClient::new(store.clone()));
        (store, client.clone(), HealthReporter::new(client))
    }

    #[test]
    fn reachable_broker_is_healthy() {
        let (_, client, reporter) = reporter();
        client.enqueue_search(NewSearchJob::new("a")).unwrap();
        client.enqueue_search(NewSearchJob::new("b")).unwrap();

        assert!(reporter.check().is_healthy());
        let stats = reporter.stats();
        assert_eq!(stats.status, HealthStatus::Healthy);
        assert_eq!(stats.queue_length, 2);
        assert!(stats.broker_available);
    }

    #[test]
    fn outage_is_unhealthy_with_unknown_depth() {
        let (store, _, reporter) = reporter();
        store.set_available(false);

        let report = reporter.check();
        assert!(!report.is_healthy());
        assert!(report.error.is_some());

        let stats = reporter.stats();
        assert_eq!(stats.queue_length, UNKNOWN_QUEUE_LENGTH);
        assert!(!stats.broker_available);
    }

    #[test]
    fn stats_include_attached_worker_counters() {
        let (_, client, reporter) = reporter();
        assert!(reporter.stats().processing.is_none());

        let counters = ProcessingCounters::default();
        let reporter = HealthReporter::new(client).with_processing(counters.clone());
        assert_eq!(reporter.stats().processing, Some(ProcessingStats::default()));
        assert_eq!(
            serde_json::to_value(reporter.stats()).unwrap()["processing"]["jobs_processed"],
            0
        );
    }

    #[test]
    fn healthy_report_omits_error() {
        let (_, _, reporter) = reporter();
        let json = serde_json::to_value(reporter.check()).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json.get("error").is_none());
    }
}

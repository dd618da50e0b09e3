//! API-side producer: decides when a search spawns background enrichment.

use std::sync::Arc;

use tracing::{info, warn};

use fynelo_core::UserId;

use crate::client::QueueClient;
use crate::job::{JobPriority, NewSearchJob, QueuedJob, SearchFilters};
use crate::store::QueueStore;

/// Searches returning this many results or more are considered satisfied.
pub const ENRICHMENT_RESULT_THRESHOLD: u64 = 50;

/// The criteria of a synchronous search, as seen by the producer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub user_id: Option<UserId>,
    pub query: String,
    pub filters: SearchFilters,
}

impl SearchRequest {
    pub fn has_search_criteria(&self) -> bool {
        !self.query.is_empty() || self.filters.has_search_criteria()
    }
}

/// Enqueues enrichment jobs for narrow searches that came back thin.
///
/// Never fails the caller: a broker outage only means no job handle.
#[derive(Debug)]
pub struct EnrichmentProducer<S> {
    client: Arc<QueueClient<S>>,
    result_threshold: u64,
}

impl<S: QueueStore> EnrichmentProducer<S> {
    pub fn new(client: Arc<QueueClient<S>>) -> Self {
        Self {
            client,
            result_threshold: ENRICHMENT_RESULT_THRESHOLD,
        }
    }

    pub fn with_result_threshold(mut self, threshold: u64) -> Self {
        self.result_threshold = threshold;
        self
    }

    /// Only searches with at least one criterion and fewer results than the
    /// threshold are worth enriching.
    pub fn should_enqueue(&self, request: &SearchRequest, current_total: u64) -> bool {
        request.has_search_criteria() && current_total < self.result_threshold
    }

    /// Enqueue enrichment for `request` if the trigger policy allows it.
    pub fn enqueue_if_needed(
        &self,
        request: &SearchRequest,
        current_total: u64,
    ) -> Option<QueuedJob> {
        if !self.should_enqueue(request, current_total) {
            return None;
        }

        let mut new = NewSearchJob::new(request.query.clone())
            .with_filters(request.filters.clone())
            .with_priority(JobPriority::Normal);
        if let Some(user_id) = request.user_id {
            new = new.with_user(user_id);
        }

        match self.client.enqueue_search(new) {
            Ok(job) => {
                info!(job_id = %job.id, current_total, "queued search for enrichment");
                Some(QueuedJob::from(&job))
            }
            Err(e) => {
                warn!(error = %e, "enrichment unavailable; returning synchronous results only");
                None
            }
        }
    }
}

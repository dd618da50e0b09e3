//! Queue client: job semantics on top of a [`QueueStore`].
//!
//! Key layout:
//!
//! | Key                   | Type    | TTL                     |
//! |-----------------------|---------|-------------------------|
//! | `search_job_counter`  | counter | none                    |
//! | `search_job:<id>`     | JSON    | 24h, refreshed on write |
//! | `search_queue`        | list    | none                    |
//! | `user_jobs:<user_id>` | set     | 24h, refreshed on add   |
//!
//! Enqueue issues its writes one after another (record, queue, user index).
//! A crash in between can leave a record that is never queued or a queued
//! job missing from its owner's index; delivery stays at-least-once.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use fynelo_core::{DomainError, JobId, UserId, ValueObject};

use crate::job::{JobTransition, NewSearchJob, SearchJob, JOB_LIFETIME};
use crate::store::{QueueStore, StoreError};

pub const SEARCH_QUEUE_KEY: &str = "search_queue";
pub const JOB_KEY_PREFIX: &str = "search_job:";
pub const JOB_COUNTER_KEY: &str = "search_job_counter";
pub const USER_JOBS_KEY_PREFIX: &str = "user_jobs:";

/// How long a dequeue waits for work before reporting an empty queue.
pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

pub fn job_key(id: &JobId) -> String {
    format!("{JOB_KEY_PREFIX}{id}")
}

pub fn user_jobs_key(user_id: UserId) -> String {
    format!("{USER_JOBS_KEY_PREFIX}{user_id}")
}

/// Queue client error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue broker unavailable: {0}")]
    BrokerUnavailable(String),
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("malformed job payload: {0}")]
    Serialization(String),
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),
    #[error("queue store error: {0}")]
    Store(String),
}

impl QueueError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::BrokerUnavailable(_) | QueueError::Store(_))
    }
}

impl From<StoreError> for QueueError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => QueueError::BrokerUnavailable(msg),
            StoreError::Command(msg) => QueueError::Store(msg),
        }
    }
}

impl From<DomainError> for QueueError {
    fn from(e: DomainError) -> Self {
        QueueError::InvalidTransition(e.to_string())
    }
}

/// Queue client configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Lifetime of job records and per-user indexes.
    pub job_ttl: Duration,
    /// Bound on a single blocking dequeue.
    pub dequeue_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            job_ttl: JOB_LIFETIME,
            dequeue_timeout: DEFAULT_DEQUEUE_TIMEOUT,
        }
    }
}

impl QueueConfig {
    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }
}

/// Narrow job API shared by producers, the worker and health reporting.
///
/// Constructed once at startup and handed to each component; it holds no
/// state besides the store handle.
#[derive(Debug)]
pub struct QueueClient<S> {
    store: S,
    config: QueueConfig,
}

impl<S: QueueStore> QueueClient<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, QueueConfig::default())
    }

    pub fn with_config(store: S, config: QueueConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Assign an id, persist the record, queue it, and index it by owner.
    pub fn enqueue_search(&self, new: NewSearchJob) -> Result<SearchJob, QueueError> {
        let id = JobId::from_sequence(self.store.incr(JOB_COUNTER_KEY)?);
        let job = SearchJob::create(id, new, Utc::now());

        self.write_job(&job)?;
        self.store.push(SEARCH_QUEUE_KEY, job.id.as_str())?;

        if let Some(user_id) = job.user_id {
            let key = user_jobs_key(user_id);
            self.store.set_add(&key, job.id.as_str())?;
            self.store.expire(&key, self.config.job_ttl)?;
        }

        debug!(
            job_id = %job.id,
            user_id = ?job.user_id,
            filtered = !job.filters.is_empty(),
            "search job enqueued"
        );
        Ok(job)
    }

    /// Pop the oldest queued job, waiting up to the configured timeout.
    ///
    /// `Ok(None)` means no work arrived in time.
    pub fn dequeue_search(&self) -> Result<Option<SearchJob>, QueueError> {
        let Some(raw_id) = self
            .store
            .pop_blocking(SEARCH_QUEUE_KEY, self.config.dequeue_timeout)?
        else {
            return Ok(None);
        };

        let id: JobId = raw_id
            .parse()
            .map_err(|e: DomainError| QueueError::Serialization(e.to_string()))?;
        self.get_job_status(&id).map(Some)
    }

    /// Apply a status transition to the stored record and refresh its lifetime.
    pub fn update_job_status(
        &self,
        id: &JobId,
        transition: JobTransition,
    ) -> Result<SearchJob, QueueError> {
        let mut job = self.get_job_status(id)?;
        job.apply(transition, Utc::now())?;
        self.write_job(&job)?;
        Ok(job)
    }

    pub fn get_job_status(&self, id: &JobId) -> Result<SearchJob, QueueError> {
        let raw = self
            .store
            .get(&job_key(id))?
            .ok_or_else(|| QueueError::JobNotFound(id.clone()))?;
        decode(&raw)
    }

    /// Jobs owned by `user_id`. Records that expired or cannot be read are
    /// skipped; the result is ordered by id sequence. Only a broker outage
    /// fails the call.
    pub fn get_user_jobs(&self, user_id: UserId) -> Result<Vec<SearchJob>, QueueError> {
        let ids = self.store.set_members(&user_jobs_key(user_id))?;

        let mut jobs = Vec::with_capacity(ids.len());
        for raw_id in ids {
            let Ok(id) = raw_id.parse::<JobId>() else {
                continue;
            };
            match self.get_job_status(&id) {
                Ok(job) => jobs.push(job),
                Err(QueueError::JobNotFound(_)) => {}
                Err(e @ QueueError::BrokerUnavailable(_)) => return Err(e),
                Err(e) => {
                    warn!(job_id = %id, error = %e, "skipping unreadable job");
                }
            }
        }

        jobs.sort_by_key(|j| (j.id.sequence(), j.id.clone()));
        Ok(jobs)
    }

    pub fn get_queue_length(&self) -> Result<u64, QueueError> {
        Ok(self.store.list_len(SEARCH_QUEUE_KEY)?)
    }

    pub fn ping(&self) -> Result<(), QueueError> {
        Ok(self.store.ping()?)
    }

    /// Delete job records whose `created_at` is older than the job lifetime.
    ///
    /// Unreadable records and keys that vanish mid-sweep are left alone; a
    /// broker outage ends the sweep.
    /// Safe to re-run; returns the number of records removed.
    pub fn cleanup_expired_jobs(&self) -> Result<usize, QueueError> {
        let now = Utc::now();
        let mut removed = 0;

        for key in self.store.keys_with_prefix(JOB_KEY_PREFIX)? {
            match self.sweep_key(&key, now) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e @ QueueError::BrokerUnavailable(_)) => return Err(e),
                Err(e) => warn!(key = %key, error = %e, "skipping unreadable job key"),
            }
        }

        if removed > 0 {
            info!(removed, "cleaned up expired search jobs");
        }
        Ok(removed)
    }

    // Whether `key` held an expired record that is now deleted.
    fn sweep_key(&self, key: &str, now: DateTime<Utc>) -> Result<bool, QueueError> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(false);
        };
        let job = decode(&raw)?;
        if !job.is_expired_at(now, self.config.job_ttl) {
            return Ok(false);
        }
        Ok(self.store.delete(key)?)
    }

    fn write_job(&self, job: &SearchJob) -> Result<(), QueueError> {
        let payload =
            serde_json::to_string(job).map_err(|e| QueueError::Serialization(e.to_string()))?;
        self.store
            .set_with_ttl(&job_key(&job.id), &payload, self.config.job_ttl)?;
        Ok(())
    }
}

fn decode(raw: &str) -> Result<SearchJob, QueueError> {
    serde_json::from_str(raw).map_err(|e| QueueError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobStatus, SearchFilters};
    use crate::store::InMemoryQueueStore;
    use std::sync::Arc;

    fn client() -> (Arc<InMemoryQueueStore>, QueueClient<Arc<InMemoryQueueStore>>) {
        let store = InMemoryQueueStore::arc();
        let config = QueueConfig::default().with_dequeue_timeout(Duration::from_millis(20));
        (store.clone(), QueueClient::with_config(store, config))
    }

    fn user(raw: u64) -> UserId {
        UserId::from_raw(raw).unwrap()
    }

    #[test]
    fn enqueued_job_is_pending_with_fresh_id() {
        let (_, client) = client();
        let job = client.enqueue_search(NewSearchJob::new("saas")).unwrap();

        let stored = client.get_job_status(&job.id).unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert!(!stored.id.as_str().is_empty());
        assert_eq!(stored, job);
    }

    #[test]
    fn ids_increase_sequentially() {
        let (_, client) = client();
        let first = client.enqueue_search(NewSearchJob::new("a")).unwrap();
        let second = client.enqueue_search(NewSearchJob::new("b")).unwrap();

        assert_eq!(first.id.as_str(), "search_1");
        assert_eq!(second.id.as_str(), "search_2");
    }

    #[test]
    fn dequeue_preserves_enqueue_order() {
        let (_, client) = client();
        let ids: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|q| client.enqueue_search(NewSearchJob::new(q)).unwrap().id)
            .collect();

        let dequeued: Vec<_> = (0..3)
            .map(|_| client.dequeue_search().unwrap().unwrap().id)
            .collect();

        assert_eq!(dequeued, ids);
        assert_eq!(client.get_queue_length().unwrap(), 0);
    }

    #[test]
    fn priority_does_not_reorder_queue() {
        let (_, client) = client();
        let low = client
            .enqueue_search(NewSearchJob::new("low").with_priority(crate::JobPriority::Low))
            .unwrap();
        client
            .enqueue_search(NewSearchJob::new("urgent").with_priority(crate::JobPriority::Urgent))
            .unwrap();

        assert_eq!(client.dequeue_search().unwrap().unwrap().id, low.id);
    }

    #[test]
    fn empty_queue_times_out_without_error() {
        let (_, client) = client();
        assert_eq!(client.dequeue_search().unwrap(), None);
    }

    #[test]
    fn status_updates_are_persisted() {
        let (_, client) = client();
        let job = client.enqueue_search(NewSearchJob::new("q")).unwrap();

        client
            .update_job_status(&job.id, JobTransition::Processing)
            .unwrap();
        let processing = client.get_job_status(&job.id).unwrap();
        assert_eq!(processing.status, JobStatus::Processing);
        assert!(processing.processed_at.is_some());

        client
            .update_job_status(
                &job.id,
                JobTransition::Completed {
                    result_count: 15,
                    failed_attempts: 0,
                },
            )
            .unwrap();
        let done = client.get_job_status(&job.id).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result_count, 15);
        assert!(done.completed_at.is_some());
        assert_eq!(done.processed_at, processing.processed_at);
    }

    #[test]
    fn backward_transition_is_rejected_and_not_written() {
        let (_, client) = client();
        let job = client.enqueue_search(NewSearchJob::new("q")).unwrap();

        let err = client
            .update_job_status(
                &job.id,
                JobTransition::Failed {
                    error: "x".into(),
                    failed_attempts: 1,
                },
            )
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition(_)));
        assert_eq!(
            client.get_job_status(&job.id).unwrap().status,
            JobStatus::Pending
        );
    }

    #[test]
    fn unknown_job_is_not_found() {
        let (_, client) = client();
        let id = JobId::from_sequence(99);
        assert_eq!(
            client.get_job_status(&id),
            Err(QueueError::JobNotFound(id.clone()))
        );
        assert!(matches!(
            client.update_job_status(&id, JobTransition::Processing),
            Err(QueueError::JobNotFound(_))
        ));
    }

    #[test]
    fn records_expire_with_the_store_ttl() {
        let (store, client) = client();
        let job = client.enqueue_search(NewSearchJob::new("q")).unwrap();

        store.fast_forward(JOB_LIFETIME + Duration::from_secs(1));
        assert!(matches!(
            client.get_job_status(&job.id),
            Err(QueueError::JobNotFound(_))
        ));
    }

    #[test]
    fn user_jobs_skip_expired_records() {
        let (store, client) = client();
        let owner = user(7);
        let jobs: Vec<_> = (0..3)
            .map(|i| {
                client
                    .enqueue_search(NewSearchJob::new(format!("q{i}")).with_user(owner))
                    .unwrap()
            })
            .collect();
        client.enqueue_search(NewSearchJob::new("other")).unwrap();

        store.delete(&job_key(&jobs[1].id)).unwrap();

        let listed: Vec<_> = client
            .get_user_jobs(owner)
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(listed, vec![jobs[0].id.clone(), jobs[2].id.clone()]);
    }

    #[test]
    fn user_jobs_skip_undecodable_records() {
        let (store, client) = client();
        let owner = user(3);
        let job = client
            .enqueue_search(NewSearchJob::new("q").with_user(owner))
            .unwrap();
        store.set_add(&user_jobs_key(owner), "search_404").unwrap();
        store
            .set_with_ttl("search_job:search_404", "{not json", JOB_LIFETIME)
            .unwrap();

        let listed = client.get_user_jobs(owner).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, job.id);
    }

    #[test]
    fn wrong_type_job_key_does_not_fail_listing_or_cleanup() {
        let (store, client) = client();
        let owner = user(5);
        let first = client
            .enqueue_search(NewSearchJob::new("a").with_user(owner))
            .unwrap();
        let second = client
            .enqueue_search(NewSearchJob::new("b").with_user(owner))
            .unwrap();
        store.set_add(&user_jobs_key(owner), "search_77").unwrap();
        store.push("search_job:search_77", "not a record").unwrap();

        let listed: Vec<_> = client
            .get_user_jobs(owner)
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(listed, vec![first.id.clone(), second.id.clone()]);

        let mut aged = first.clone();
        aged.created_at = Utc::now() - chrono::Duration::hours(25);
        store
            .set_with_ttl(
                &job_key(&aged.id),
                &serde_json::to_string(&aged).unwrap(),
                JOB_LIFETIME,
            )
            .unwrap();

        assert_eq!(client.cleanup_expired_jobs().unwrap(), 1);
        assert!(client.get_job_status(&second.id).is_ok());
    }

    #[test]
    fn unknown_user_has_no_jobs() {
        let (_, client) = client();
        assert!(client.get_user_jobs(user(1)).unwrap().is_empty());
    }

    #[test]
    fn cleanup_removes_only_records_past_lifetime() {
        let (store, client) = client();
        let old = client.enqueue_search(NewSearchJob::new("old")).unwrap();
        let recent = client.enqueue_search(NewSearchJob::new("recent")).unwrap();

        for (job, age_hours) in [(&old, 25), (&recent, 1)] {
            let mut aged = job.clone();
            aged.created_at = Utc::now() - chrono::Duration::hours(age_hours);
            store
                .set_with_ttl(
                    &job_key(&aged.id),
                    &serde_json::to_string(&aged).unwrap(),
                    JOB_LIFETIME,
                )
                .unwrap();
        }

        assert_eq!(client.cleanup_expired_jobs().unwrap(), 1);
        assert!(matches!(
            client.get_job_status(&old.id),
            Err(QueueError::JobNotFound(_))
        ));
        assert!(client.get_job_status(&recent.id).is_ok());

        // Idempotent.
        assert_eq!(client.cleanup_expired_jobs().unwrap(), 0);
    }

    #[test]
    fn malformed_record_is_a_serialization_error() {
        let (store, client) = client();
        store
            .set_with_ttl("search_job:search_5", "[]", JOB_LIFETIME)
            .unwrap();
        assert!(matches!(
            client.get_job_status(&JobId::from_sequence(5)),
            Err(QueueError::Serialization(_))
        ));
    }

    #[test]
    fn offline_broker_maps_to_unavailable() {
        let (store, client) = client();
        store.set_available(false);

        let err = client.enqueue_search(NewSearchJob::new("q")).unwrap_err();
        assert!(matches!(err, QueueError::BrokerUnavailable(_)));
        assert!(err.is_transient());
        assert!(matches!(
            client.dequeue_search(),
            Err(QueueError::BrokerUnavailable(_))
        ));
        assert!(client.ping().is_err());
    }

    #[test]
    fn payload_round_trips_filters() {
        let (_, client) = client();
        let filters = SearchFilters {
            industry: Some("fintech".into()),
            founded_min: Some(2015),
            ..Default::default()
        };
        let job = client
            .enqueue_search(NewSearchJob::new("q").with_filters(filters.clone()))
            .unwrap();
        assert_eq!(client.get_job_status(&job.id).unwrap().filters, filters);
    }
}

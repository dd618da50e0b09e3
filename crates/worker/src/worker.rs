//! Search worker: dequeues jobs, runs them with retry and backoff, and records
//! the outcome.
//!
//! A job is persisted twice: `processing` when picked up and its terminal
//! status once attempts are exhausted or it succeeds. Retries stay inside a
//! single dequeue; the job is never pushed back onto the queue.

use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use fynelo_queue::{JobStatus, JobTransition, QueueClient, QueueError, QueueStore, SearchJob};

use crate::operation::{OperationError, SearchOperation};
use crate::retry::RetryPolicy;

/// Pause after a failed dequeue before polling again.
pub const DEFAULT_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    pub jobs_processed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    /// Jobs dropped because their status could not be written
    pub jobs_abandoned: u64,
}

/// Shared counters written by the worker loop and read by the stats endpoint.
#[derive(Debug, Clone, Default)]
pub struct ProcessingCounters(Arc<Mutex<ProcessingStats>>);

impl ProcessingCounters {
    pub fn snapshot(&self) -> ProcessingStats {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, outcome: &Result<SearchJob, QueueError>) {
        let mut s = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        s.jobs_processed += 1;
        match outcome {
            Ok(job) if job.status == JobStatus::Completed => s.jobs_completed += 1,
            Ok(_) => s.jobs_failed += 1,
            Err(_) => s.jobs_abandoned += 1,
        }
    }
}

/// How a graceful shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The loop observed the stop signal and exited
    Drained,
    /// The budget elapsed first; the loop thread was left to finish alone
    TimedOut,
}

/// Handle to control a running worker loop.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    done: mpsc::Receiver<()>,
    join: Option<thread::JoinHandle<()>>,
    counters: ProcessingCounters,
}

impl WorkerHandle {
    /// Signal stop and wait up to `budget` for the loop to exit.
    ///
    /// The stop signal is observed between jobs, so a job mid-backoff finishes
    /// its attempts first.
    pub fn shutdown(mut self, budget: Duration) -> ShutdownOutcome {
        let _ = self.shutdown.send(());

        match self.done.recv_timeout(budget) {
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(budget_ms = budget.as_millis() as u64, "worker did not drain before shutdown budget");
                ShutdownOutcome::TimedOut
            }
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if let Some(j) = self.join.take() {
                    let _ = j.join();
                }
                ShutdownOutcome::Drained
            }
        }
    }

    /// Counters that stay readable after the handle is consumed by shutdown.
    pub fn counters(&self) -> ProcessingCounters {
        self.counters.clone()
    }
}

/// Single logical consumer of the search queue.
pub struct SearchWorker<S, O> {
    name: String,
    client: Arc<QueueClient<S>>,
    operation: O,
    retry: RetryPolicy,
    error_pause: Duration,
}

impl<S, O> SearchWorker<S, O>
where
    S: QueueStore + 'static,
    O: SearchOperation + 'static,
{
    pub fn new(client: Arc<QueueClient<S>>, operation: O) -> Self {
        Self {
            name: "search-worker".to_string(),
            client,
            operation,
            retry: RetryPolicy::default(),
            error_pause: DEFAULT_ERROR_PAUSE,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_error_pause(mut self, pause: Duration) -> Self {
        self.error_pause = pause;
        self
    }

    /// Spawn the worker loop on its own thread.
    pub fn spawn(self) -> std::io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let counters = ProcessingCounters::default();
        let loop_counters = counters.clone();

        let join = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                worker_loop(&self, &shutdown_rx, &loop_counters);
                let _ = done_tx.send(());
            })?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            done: done_rx,
            join: Some(join),
            counters,
        })
    }

    /// Run one dequeued job to a terminal status.
    ///
    /// Returns the terminal record. An error means a status write failed; if
    /// the `processing` write fails the job is abandoned without running.
    pub fn process_job(&self, job: SearchJob) -> Result<SearchJob, QueueError> {
        let job = match self
            .client
            .update_job_status(&job.id, JobTransition::Processing)
        {
            Ok(job) => job,
            Err(e) => {
                error!(worker = %self.name, job_id = %job.id, error = %e, "could not mark job processing; abandoning");
                return Err(e);
            }
        };

        let started = Instant::now();
        let budget = self.retry.attempts_for(&job);
        let mut last_error: Option<OperationError> = None;
        let mut failed_attempts = 0;

        for attempt in 1..=budget {
            match self.operation.execute(&job) {
                Ok(result_count) => {
                    info!(
                        worker = %self.name,
                        job_id = %job.id,
                        attempt,
                        result_count,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "search job completed"
                    );
                    return self.client.update_job_status(
                        &job.id,
                        JobTransition::Completed {
                            result_count,
                            failed_attempts,
                        },
                    );
                }
                Err(e) => {
                    failed_attempts = attempt;
                    warn!(worker = %self.name, job_id = %job.id, attempt, error = %e, "search job attempt failed");

                    if !e.is_retryable() {
                        debug!(job_id = %job.id, kind = ?e.kind, "non-retryable failure");
                        last_error = Some(e);
                        break;
                    }
                    last_error = Some(e);

                    if self.retry.should_retry(attempt, budget) {
                        thread::sleep(self.retry.delay_for_attempt(attempt));
                    }
                }
            }
        }

        let error = last_error.map_or_else(|| "no attempts made".to_string(), |e| e.to_string());
        warn!(
            worker = %self.name,
            job_id = %job.id,
            attempts = failed_attempts,
            elapsed_ms = started.elapsed().as_millis() as u64,
            error = %error,
            "search job failed"
        );
        self.client.update_job_status(
            &job.id,
            JobTransition::Failed {
                error,
                failed_attempts,
            },
        )
    }
}

fn worker_loop<S, O>(
    worker: &SearchWorker<S, O>,
    shutdown_rx: &mpsc::Receiver<()>,
    counters: &ProcessingCounters,
) where
    S: QueueStore + 'static,
    O: SearchOperation + 'static,
{
    info!(worker = %worker.name, "search worker started");

    loop {
        match shutdown_rx.try_recv() {
            Ok(()) | Err(mpsc::TryRecvError::Disconnected) => break,
            Err(mpsc::TryRecvError::Empty) => {}
        }

        match worker.client.dequeue_search() {
            Ok(Some(job)) => {
                let outcome = worker.process_job(job);
                counters.record(&outcome);
            }
            Ok(None) => continue,
            Err(QueueError::JobNotFound(id)) => {
                debug!(worker = %worker.name, job_id = %id, "queued job expired before pickup");
            }
            Err(e) => {
                error!(worker = %worker.name, error = %e, "failed to dequeue search job");
                thread::sleep(worker.error_pause);
            }
        }
    }

    info!(worker = %worker.name, "search worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use fynelo_queue::{InMemoryQueueStore, NewSearchJob, QueueConfig};

    use crate::operation::{OperationErrorKind, PlaceholderEnrichment};

    type Store = Arc<InMemoryQueueStore>;

    fn client() -> (Store, Arc<QueueClient<Store>>) {
        let store = InMemoryQueueStore::arc();
        let config = QueueConfig::default().with_dequeue_timeout(Duration::from_millis(20));
        (store.clone(), Arc::new(QueueClient::with_config(store, config)))
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::exponential(3, Duration::from_millis(10), Duration::from_millis(15))
    }

    fn worker<O: SearchOperation + 'static>(
        client: &Arc<QueueClient<Store>>,
        op: O,
    ) -> SearchWorker<Store, O> {
        SearchWorker::new(client.clone(), op)
            .with_retry_policy(fast_retry())
            .with_error_pause(Duration::from_millis(10))
    }

    fn op<F>(f: F) -> F
    where
        F: Fn(&SearchJob) -> Result<u64, OperationError> + Send + Sync,
    {
        f
    }

    fn dequeue(client: &QueueClient<Store>) -> SearchJob {
        client.dequeue_search().unwrap().unwrap()
    }

    fn wait_for_status(client: &QueueClient<Store>, job: &SearchJob, status: JobStatus) -> SearchJob {
        for _ in 0..200 {
            let current = client.get_job_status(&job.id).unwrap();
            if current.status == status {
                return current;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("job {} never reached {status}", job.id);
    }

    #[test]
    fn retryable_failure_exhausts_budget_with_backoff() {
        let (_, client) = client();
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let w = worker(&client, op(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(OperationError::transient("upstream timeout"))
        }));

        client
            .enqueue_search(NewSearchJob::new("fintech").with_max_retries(3))
            .unwrap();
        let started = Instant::now();
        let done = w.process_job(dequeue(&client)).unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.retry_count, 3);
        assert_eq!(done.error_msg.as_deref(), Some("upstream timeout"));
        // 10ms after attempt 1, 15ms (capped) after attempt 2, none after the last
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn non_retryable_failure_stops_after_one_attempt() {
        let (_, client) = client();
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let w = worker(&client, op(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(OperationError::new(OperationErrorKind::Unauthorized, "unauthorized"))
        }));

        client.enqueue_search(NewSearchJob::new("x")).unwrap();
        let done = w.process_job(dequeue(&client)).unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.retry_count, 1);
    }

    #[test]
    fn success_on_later_attempt_completes() {
        let (_, client) = client();
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let w = worker(&client, op(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(OperationError::transient("flaky"))
            } else {
                Ok(42)
            }
        }));

        client.enqueue_search(NewSearchJob::new("x")).unwrap();
        let done = w.process_job(dequeue(&client)).unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result_count, 42);
        assert_eq!(done.retry_count, 1);
        assert!(done.completed_at.is_some());
        assert!(done.processed_at.is_some());
    }

    #[test]
    fn fail_query_ends_failed_after_three_attempts() {
        let (_, client) = client();
        let w = worker(&client, PlaceholderEnrichment::with_delay(Duration::ZERO));

        client
            .enqueue_search(NewSearchJob::new("fail").with_max_retries(3))
            .unwrap();
        let done = w.process_job(dequeue(&client)).unwrap();

        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.retry_count, 3);
        assert!(!done.error_msg.unwrap_or_default().is_empty());
    }

    #[test]
    fn job_already_picked_up_is_abandoned() {
        let (_, client) = client();
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let w = worker(&client, op(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }));

        let job = client.enqueue_search(NewSearchJob::new("x")).unwrap();
        client
            .update_job_status(&job.id, JobTransition::Processing)
            .unwrap();

        let err = w.process_job(dequeue(&client)).unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn spawned_loop_processes_queue_and_drains() {
        let (_, client) = client();
        let first = client.enqueue_search(NewSearchJob::new("a")).unwrap();
        let second = client.enqueue_search(NewSearchJob::new("b")).unwrap();

        let handle = worker(&client, op(|_| Ok(7))).spawn().unwrap();
        wait_for_status(&client, &first, JobStatus::Completed);
        let done = wait_for_status(&client, &second, JobStatus::Completed);
        assert_eq!(done.result_count, 7);

        let counters = handle.counters();
        assert_eq!(handle.shutdown(Duration::from_secs(2)), ShutdownOutcome::Drained);
        // The loop has exited, so both jobs have been counted.
        let stats = counters.snapshot();
        assert_eq!(stats.jobs_processed, 2);
        assert_eq!(stats.jobs_completed, 2);
    }

    #[test]
    fn loop_survives_broker_outage() {
        let (store, client) = client();
        store.set_available(false);

        let handle = worker(&client, op(|_| Ok(1))).spawn().unwrap();
        thread::sleep(Duration::from_millis(50));
        store.set_available(true);

        let job = client.enqueue_search(NewSearchJob::new("a")).unwrap();
        wait_for_status(&client, &job, JobStatus::Completed);
        assert_eq!(handle.shutdown(Duration::from_secs(2)), ShutdownOutcome::Drained);
    }

    #[test]
    fn shutdown_reports_timeout_when_job_outlives_budget() {
        let (_, client) = client();
        let job = client.enqueue_search(NewSearchJob::new("slow")).unwrap();

        let handle = worker(
            &client,
            op(|_| {
                thread::sleep(Duration::from_millis(300));
                Ok(1)
            }),
        )
        .spawn()
        .unwrap();
        wait_for_status(&client, &job, JobStatus::Processing);

        assert_eq!(
            handle.shutdown(Duration::from_millis(10)),
            ShutdownOutcome::TimedOut
        );
    }
}

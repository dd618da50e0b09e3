//! Periodic sweep of expired job records.

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use fynelo_queue::{QueueClient, QueueStore};

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Handle to stop the cleanup thread.
#[derive(Debug)]
pub struct CleanupHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl CleanupHandle {
    /// Request shutdown and wait for the thread to stop.
    ///
    /// A sweep already in progress finishes first.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Run `cleanup_expired_jobs` every `interval` until shut down.
///
/// The first sweep happens one interval after start.
pub fn spawn<S>(client: Arc<QueueClient<S>>, interval: Duration) -> std::io::Result<CleanupHandle>
where
    S: QueueStore + 'static,
{
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let join = thread::Builder::new()
        .name("job-cleanup".to_string())
        .spawn(move || {
            info!(interval_secs = interval.as_secs(), "job cleanup started");
            loop {
                match shutdown_rx.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => match client.cleanup_expired_jobs() {
                        Ok(removed) => debug!(removed, "cleanup sweep finished"),
                        Err(e) => warn!(error = %e, "cleanup sweep failed"),
                    },
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("job cleanup stopped");
        })?;

    Ok(CleanupHandle {
        shutdown: shutdown_tx,
        join: Some(join),
    })
}

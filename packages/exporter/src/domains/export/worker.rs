//! Export worker service.
//!
//! Long-running loop that listens on the push queue and periodically scans
//! the job store for due jobs. Both admission paths funnel through the same
//! claim-and-process sequence; the scan guarantees eventual processing even
//! if a queue message is lost.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::kernel::ExportDeps;

use super::actions::{self, ProcessOutcome};

/// Configuration for the export worker.
#[derive(Debug, Clone)]
pub struct ExportWorkerConfig {
    /// Worker ID for this instance; doubles as the lock token.
    pub worker_id: String,
    /// How often to scan for due jobs
    pub poll_interval: Duration,
    /// Maximum number of jobs to pick up per scan
    pub batch_size: i64,
    /// Attempts after which a retryable failure becomes terminal
    pub max_attempts: i32,
}

impl Default for ExportWorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 3,
        }
    }
}

impl ExportWorkerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

/// A worker that drives export jobs to completion.
///
/// Each worker processes one job at a time; run several workers for
/// throughput. The job store's atomic claim keeps them from colliding.
pub struct ExportWorker {
    deps: ExportDeps,
    config: ExportWorkerConfig,
    queue_rx: Option<UnboundedReceiver<Uuid>>,
}

impl ExportWorker {
    pub fn new(deps: ExportDeps) -> Self {
        Self::with_config(deps, ExportWorkerConfig::default())
    }

    pub fn with_config(deps: ExportDeps, config: ExportWorkerConfig) -> Self {
        Self {
            deps,
            config,
            queue_rx: None,
        }
    }

    /// Attach the push-path receiver created alongside
    /// [`crate::kernel::jobs::InProcessJobQueue`].
    pub fn with_queue(mut self, queue_rx: UnboundedReceiver<Uuid>) -> Self {
        self.queue_rx = Some(queue_rx);
        self
    }

    /// Run until the token is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            worker_id = %self.config.worker_id,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "export worker starting"
        );

        // The first tick fires immediately, covering jobs left over from a
        // previous run.
        let mut poll = tokio::time::interval(self.config.poll_interval);
        let mut queue_rx = self.queue_rx.take();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(job_id) = recv_or_pending(&mut queue_rx) => {
                    self.process(job_id).await;
                }
                _ = poll.tick() => {
                    self.scan().await;
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "export worker stopped");
    }

    async fn scan(&self) {
        let due = match self.deps.store.due_jobs(self.config.batch_size).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "failed to scan for due jobs");
                return;
            }
        };

        for job_id in due {
            self.process(job_id).await;
        }

        match self.deps.store.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "purged expired export jobs"),
            Err(e) => error!(error = %e, "failed to purge expired jobs"),
        }
    }

    /// Process a single job id. Claim conflicts are skips, not faults.
    pub async fn process(&self, job_id: Uuid) {
        let outcome = actions::process_export_job(
            &self.deps,
            job_id,
            &self.config.worker_id,
            self.config.max_attempts,
        )
        .await;

        match outcome {
            Ok(ProcessOutcome::Completed { file_url }) => {
                debug!(job_id = %job_id, file_url = %file_url, "job completed");
            }
            Ok(ProcessOutcome::Skipped) => {
                debug!(job_id = %job_id, "job not claimable, skipping");
            }
            Ok(ProcessOutcome::RetryScheduled { attempt, delay }) => {
                debug!(
                    job_id = %job_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retry scheduled"
                );
            }
            Ok(ProcessOutcome::Failed { error }) => {
                debug!(job_id = %job_id, error = %error, "job failed terminally");
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "job processing hit a store failure");
            }
        }
    }
}

async fn recv_or_pending(rx: &mut Option<UnboundedReceiver<Uuid>>) -> Option<Uuid> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

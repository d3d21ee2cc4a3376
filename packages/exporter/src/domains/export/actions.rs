//! Export job entry points: submission, worker processing, status reads.
//!
//! Submission returns immediately; callers poll job status via
//! [`get_export_job`]. Processing errors never surface synchronously.

use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::kernel::jobs::{
    ClaimOutcome, ExportJob, NewExportJob, RetryDecision, RetryPolicy, StoreError,
};
use crate::kernel::ExportDeps;

use super::pipeline::{ExportError, ExportPipeline};

/// Outcome of one worker pass over a job.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The job is completed; the bundle is available at `file_url`.
    Completed { file_url: String },
    /// Nothing to do: the job was not claimable and has not completed.
    Skipped,
    /// A transient failure was rescheduled.
    RetryScheduled { attempt: i32, delay: Duration },
    /// The job failed terminally.
    Failed { error: String },
}

/// Submit a new export job. Returns immediately; processing is asynchronous.
pub async fn create_export_job(
    deps: &ExportDeps,
    organization_id: Uuid,
    framework_id: Uuid,
    requested_by: &str,
) -> Result<Uuid, StoreError> {
    let job = deps
        .store
        .create(
            NewExportJob::builder()
                .organization_id(organization_id)
                .framework_id(framework_id)
                .requested_by(requested_by)
                .retention(deps.retention)
                .build(),
        )
        .await?;

    deps.queue.enqueue(job.id);
    info!(
        job_id = %job.id,
        organization_id = %organization_id,
        framework_id = %framework_id,
        requested_by,
        "export job submitted"
    );
    Ok(job.id)
}

/// Read a job's current state. Errors with `NotFound` once the job expires.
pub async fn get_export_job(deps: &ExportDeps, job_id: Uuid) -> Result<ExportJob, StoreError> {
    deps.store.get(job_id).await
}

/// Claim and drive one job to completion, retry, or terminal failure.
///
/// Both admission paths (push queue and periodic scan) call this. A claim
/// conflict is a skip, never a fault; reprocessing a completed job answers
/// idempotently with the recorded artifact.
pub async fn process_export_job(
    deps: &ExportDeps,
    job_id: Uuid,
    worker_id: &str,
    max_attempts: i32,
) -> Result<ProcessOutcome, StoreError> {
    let job = match deps.store.claim(job_id, worker_id).await? {
        ClaimOutcome::Claimed(job) => job,
        ClaimOutcome::NotClaimable => {
            return Ok(match deps.store.get(job_id).await {
                Ok(job) => match job.artifact() {
                    Some(artifact) => ProcessOutcome::Completed {
                        file_url: artifact.file_url,
                    },
                    None => ProcessOutcome::Skipped,
                },
                Err(StoreError::NotFound(_)) => ProcessOutcome::Skipped,
                Err(e) => return Err(e),
            });
        }
    };

    let pipeline = ExportPipeline::from_deps(deps);
    let result = match tokio::time::timeout(deps.job_timeout, pipeline.run(&job, worker_id)).await {
        Ok(result) => result,
        Err(_) => Err(ExportError::Timeout(deps.job_timeout)),
    };

    match result {
        Ok(artifact) => Ok(ProcessOutcome::Completed {
            file_url: artifact.file_url,
        }),
        Err(error) => finalize_failure(deps, &job, worker_id, max_attempts, error).await,
    }
}

async fn finalize_failure(
    deps: &ExportDeps,
    job: &ExportJob,
    worker_id: &str,
    max_attempts: i32,
    error: ExportError,
) -> Result<ProcessOutcome, StoreError> {
    let message = error.to_string();
    let policy = RetryPolicy {
        max_attempts,
        ..deps.retry.clone()
    };

    let finalized = match policy.decide(job.attempt_count, error.kind()) {
        RetryDecision::Retry(delay) => deps
            .store
            .schedule_retry(job.id, worker_id, delay, &message)
            .await
            .map(|_| {
                warn!(
                    job_id = %job.id,
                    attempt = job.attempt_count,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "export attempt failed, retry scheduled"
                );
                ProcessOutcome::RetryScheduled {
                    attempt: job.attempt_count,
                    delay,
                }
            }),
        RetryDecision::GiveUp => deps
            .store
            .fail(job.id, worker_id, &message)
            .await
            .map(|_| {
                warn!(
                    job_id = %job.id,
                    attempt = job.attempt_count,
                    error = %message,
                    "export job failed terminally"
                );
                ProcessOutcome::Failed {
                    error: message.clone(),
                }
            }),
    };

    match finalized {
        Ok(outcome) => Ok(outcome),
        // Another worker reclaimed the stale lock while this attempt was
        // finishing; its outcome wins and ours is dropped.
        Err(StoreError::LockLost(_)) => {
            warn!(job_id = %job.id, worker_id, "lock lost before finalization, dropping result");
            Ok(ProcessOutcome::Skipped)
        }
        Err(e) => Err(e),
    }
}

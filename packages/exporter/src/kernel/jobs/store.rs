//! Job store contract and PostgreSQL implementation.
//!
//! Every conflicting update (claim, complete, schedule_retry, fail) is a
//! single conditional `UPDATE ... WHERE ...` so concurrent workers cannot
//! interleave read-then-write transitions.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::job::{ExportJob, NewExportJob, PublishedArtifact};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("export job {0} not found")]
    NotFound(Uuid),
    /// The caller no longer holds the job's lock; another worker reclaimed it.
    #[error("export job {0} is no longer locked by this worker")]
    LockLost(Uuid),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Storage(e.into())
    }
}

/// Result of a claim attempt. `NotClaimable` is a normal outcome ("nothing
/// to do"), never a fault.
#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(ExportJob),
    NotClaimable,
}

impl ClaimOutcome {
    /// Unwrap the claimed job, if any.
    pub fn claimed(self) -> Option<ExportJob> {
        match self {
            ClaimOutcome::Claimed(job) => Some(job),
            ClaimOutcome::NotClaimable => None,
        }
    }
}

/// Durable, race-free storage of [`ExportJob`] records.
#[async_trait]
pub trait ExportJobStore: Send + Sync {
    /// Insert a new job in `pending` with zero attempts.
    async fn create(&self, new_job: NewExportJob) -> Result<ExportJob, StoreError>;

    /// Atomically claim a job for `worker_id`.
    ///
    /// Claimable iff the job is pending and due, or its lock has gone stale
    /// (the owning worker presumably crashed). Increments `attempt_count`,
    /// clears `last_error`, and resets `progress`.
    async fn claim(&self, job_id: Uuid, worker_id: &str) -> Result<ClaimOutcome, StoreError>;

    /// Record a progress checkpoint. Regressions are ignored so out-of-order
    /// updates cannot move the bar backwards.
    async fn update_progress(&self, job_id: Uuid, percent: i32) -> Result<(), StoreError>;

    /// Mark the job completed with its published artifact. Guarded by the
    /// caller's lock token; returns [`StoreError::LockLost`] if another
    /// worker reclaimed the job.
    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        artifact: &PublishedArtifact,
    ) -> Result<(), StoreError>;

    /// Release the lock and reschedule the job after `delay`. Leaves
    /// `attempt_count` untouched (already incremented at claim time).
    async fn schedule_retry(
        &self,
        job_id: Uuid,
        worker_id: &str,
        delay: Duration,
        error: &str,
    ) -> Result<(), StoreError>;

    /// Release the lock and mark the job terminally failed.
    async fn fail(&self, job_id: Uuid, worker_id: &str, error: &str) -> Result<(), StoreError>;

    /// Read a job. Expired jobs read as [`StoreError::NotFound`].
    async fn get(&self, job_id: Uuid) -> Result<ExportJob, StoreError>;

    /// Scan for jobs a worker should claim: pending-and-due or stale-locked,
    /// oldest first.
    async fn due_jobs(&self, limit: i64) -> Result<Vec<Uuid>, StoreError>;

    /// Delete jobs whose retention window has elapsed. Returns the count.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

/// PostgreSQL-backed job store.
pub struct PostgresExportJobStore {
    pool: PgPool,
    lock_staleness: Duration,
}

impl PostgresExportJobStore {
    /// Create a store with the default 10 minute lock staleness threshold.
    pub fn new(pool: PgPool) -> Self {
        Self::with_lock_staleness(pool, Duration::from_secs(600))
    }

    /// Create a store with a custom lock staleness threshold. This should
    /// match the pipeline's wall-clock timeout so a crashed worker's job is
    /// reclaimable as soon as no live run can still hold it.
    pub fn with_lock_staleness(pool: PgPool, lock_staleness: Duration) -> Self {
        Self {
            pool,
            lock_staleness,
        }
    }
}

#[async_trait]
impl ExportJobStore for PostgresExportJobStore {
    async fn create(&self, new_job: NewExportJob) -> Result<ExportJob, StoreError> {
        let job = ExportJob::from_new(new_job);

        let inserted = sqlx::query_as::<_, ExportJob>(
            r#"
            INSERT INTO export_jobs (
                id, organization_id, framework_id, requested_by, status, progress,
                attempt_count, locked_by, locked_at, next_run_at, file_url, file_size,
                last_error, metadata, created_at, started_at, completed_at, expires_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18
            )
            RETURNING id, organization_id, framework_id, requested_by, status, progress,
                      attempt_count, locked_by, locked_at, next_run_at, file_url, file_size,
                      last_error, metadata, created_at, started_at, completed_at, expires_at
            "#,
        )
        .bind(job.id)
        .bind(job.organization_id)
        .bind(job.framework_id)
        .bind(&job.requested_by)
        .bind(job.status)
        .bind(job.progress)
        .bind(job.attempt_count)
        .bind(&job.locked_by)
        .bind(job.locked_at)
        .bind(job.next_run_at)
        .bind(&job.file_url)
        .bind(job.file_size)
        .bind(&job.last_error)
        .bind(&job.metadata)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    async fn claim(&self, job_id: Uuid, worker_id: &str) -> Result<ClaimOutcome, StoreError> {
        let claimed = sqlx::query_as::<_, ExportJob>(
            r#"
            UPDATE export_jobs
            SET status = 'processing',
                locked_by = $2,
                locked_at = NOW(),
                started_at = NOW(),
                attempt_count = attempt_count + 1,
                last_error = NULL,
                progress = 0,
                next_run_at = NULL
            WHERE id = $1
              AND (
                  (status = 'pending' AND (next_run_at IS NULL OR next_run_at <= NOW()))
                  OR (status = 'processing' AND locked_at < NOW() - ($3 || ' milliseconds')::INTERVAL)
              )
            RETURNING id, organization_id, framework_id, requested_by, status, progress,
                      attempt_count, locked_by, locked_at, next_run_at, file_url, file_size,
                      last_error, metadata, created_at, started_at, completed_at, expires_at
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(self.lock_staleness.as_millis().to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match claimed {
            Some(job) => ClaimOutcome::Claimed(job),
            None => ClaimOutcome::NotClaimable,
        })
    }

    async fn update_progress(&self, job_id: Uuid, percent: i32) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE export_jobs
            SET progress = LEAST($2, 100)
            WHERE id = $1 AND status = 'processing' AND progress <= $2
            "#,
        )
        .bind(job_id)
        .bind(percent)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        artifact: &PublishedArtifact,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE export_jobs
            SET status = 'completed',
                progress = 100,
                file_url = $3,
                file_size = $4,
                metadata = $5,
                last_error = NULL,
                locked_by = NULL,
                locked_at = NULL,
                completed_at = NOW()
            WHERE id = $1 AND status = 'processing' AND locked_by = $2
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(&artifact.file_url)
        .bind(artifact.file_size)
        .bind(&artifact.metadata)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::LockLost(job_id));
        }
        Ok(())
    }

    async fn schedule_retry(
        &self,
        job_id: Uuid,
        worker_id: &str,
        delay: Duration,
        error: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE export_jobs
            SET status = 'pending',
                next_run_at = NOW() + ($3 || ' milliseconds')::INTERVAL,
                last_error = $4,
                locked_by = NULL,
                locked_at = NULL
            WHERE id = $1 AND status = 'processing' AND locked_by = $2
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(delay.as_millis().to_string())
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::LockLost(job_id));
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, worker_id: &str, error: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE export_jobs
            SET status = 'failed',
                last_error = $3,
                locked_by = NULL,
                locked_at = NULL
            WHERE id = $1 AND status = 'processing' AND locked_by = $2
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::LockLost(job_id));
        }
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<ExportJob, StoreError> {
        let job = sqlx::query_as::<_, ExportJob>(
            r#"
            SELECT id, organization_id, framework_id, requested_by, status, progress,
                   attempt_count, locked_by, locked_at, next_run_at, file_url, file_size,
                   last_error, metadata, created_at, started_at, completed_at, expires_at
            FROM export_jobs
            WHERE id = $1 AND expires_at > NOW()
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        job.ok_or(StoreError::NotFound(job_id))
    }

    async fn due_jobs(&self, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM export_jobs
            WHERE (status = 'pending' AND (next_run_at IS NULL OR next_run_at <= NOW()))
               OR (status = 'processing' AND locked_at < NOW() - ($2 || ' milliseconds')::INTERVAL)
            ORDER BY COALESCE(next_run_at, created_at) ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(self.lock_staleness.as_millis().to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM export_jobs WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

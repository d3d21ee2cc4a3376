//! In-memory job store for tests and local development.
//!
//! Implements the same claim/release semantics as the PostgreSQL store so
//! pipeline and worker behavior can be exercised without a database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::job::{ExportJob, ExportStatus, NewExportJob, PublishedArtifact};
use super::store::{ClaimOutcome, ExportJobStore, StoreError};

pub struct InMemoryExportJobStore {
    jobs: Mutex<HashMap<Uuid, ExportJob>>,
    lock_staleness: chrono::Duration,
}

impl Default for InMemoryExportJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryExportJobStore {
    pub fn new() -> Self {
        Self::with_lock_staleness(Duration::from_secs(600))
    }

    pub fn with_lock_staleness(lock_staleness: Duration) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            lock_staleness: chrono::Duration::from_std(lock_staleness)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, ExportJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read a job regardless of expiry, for test inspection.
    pub fn snapshot(&self, job_id: Uuid) -> Option<ExportJob> {
        self.lock().get(&job_id).cloned()
    }

    fn finalize<F>(&self, job_id: Uuid, worker_id: &str, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ExportJob),
    {
        let mut jobs = self.lock();
        let job = jobs.get_mut(&job_id).ok_or(StoreError::LockLost(job_id))?;

        // Lock token comparison: a stale-lock reclaim rewrites locked_by, so
        // the previous owner's finalization must not land.
        if job.status != ExportStatus::Processing || job.locked_by.as_deref() != Some(worker_id) {
            return Err(StoreError::LockLost(job_id));
        }

        apply(job);
        job.locked_by = None;
        job.locked_at = None;
        Ok(())
    }
}

#[async_trait]
impl ExportJobStore for InMemoryExportJobStore {
    async fn create(&self, new_job: NewExportJob) -> Result<ExportJob, StoreError> {
        let job = ExportJob::from_new(new_job);
        self.lock().insert(job.id, job.clone());
        Ok(job)
    }

    async fn claim(&self, job_id: Uuid, worker_id: &str) -> Result<ClaimOutcome, StoreError> {
        let now = Utc::now();
        let mut jobs = self.lock();

        let Some(job) = jobs.get_mut(&job_id) else {
            return Ok(ClaimOutcome::NotClaimable);
        };

        let stale_lock = job.status == ExportStatus::Processing
            && !job.lock_is_live(now, self.lock_staleness);
        if !job.is_due(now) && !stale_lock {
            return Ok(ClaimOutcome::NotClaimable);
        }

        job.status = ExportStatus::Processing;
        job.locked_by = Some(worker_id.to_string());
        job.locked_at = Some(now);
        job.started_at = Some(now);
        job.attempt_count += 1;
        job.last_error = None;
        job.progress = 0;
        job.next_run_at = None;

        Ok(ClaimOutcome::Claimed(job.clone()))
    }

    async fn update_progress(&self, job_id: Uuid, percent: i32) -> Result<(), StoreError> {
        let mut jobs = self.lock();
        if let Some(job) = jobs.get_mut(&job_id) {
            if job.status == ExportStatus::Processing && percent >= job.progress {
                job.progress = percent.min(100);
            }
        }
        Ok(())
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        artifact: &PublishedArtifact,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        self.finalize(job_id, worker_id, |job| {
            job.status = ExportStatus::Completed;
            job.progress = 100;
            job.file_url = Some(artifact.file_url.clone());
            job.file_size = Some(artifact.file_size);
            job.metadata = Some(artifact.metadata.clone());
            job.last_error = None;
            job.completed_at = Some(now);
        })
    }

    async fn schedule_retry(
        &self,
        job_id: Uuid,
        worker_id: &str,
        delay: Duration,
        error: &str,
    ) -> Result<(), StoreError> {
        let next_run = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        self.finalize(job_id, worker_id, |job| {
            job.status = ExportStatus::Pending;
            job.next_run_at = Some(next_run);
            job.last_error = Some(error.to_string());
        })
    }

    async fn fail(&self, job_id: Uuid, worker_id: &str, error: &str) -> Result<(), StoreError> {
        self.finalize(job_id, worker_id, |job| {
            job.status = ExportStatus::Failed;
            job.last_error = Some(error.to_string());
        })
    }

    async fn get(&self, job_id: Uuid) -> Result<ExportJob, StoreError> {
        let now = Utc::now();
        self.lock()
            .get(&job_id)
            .filter(|job| !job.is_expired(now))
            .cloned()
            .ok_or(StoreError::NotFound(job_id))
    }

    async fn due_jobs(&self, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        let now = Utc::now();
        let jobs = self.lock();

        let mut due: Vec<&ExportJob> = jobs
            .values()
            .filter(|job| {
                job.is_due(now)
                    || (job.status == ExportStatus::Processing
                        && !job.lock_is_live(now, self.lock_staleness))
            })
            .collect();
        due.sort_by_key(|job| job.next_run_at.unwrap_or(job.created_at));

        Ok(due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|job| job.id)
            .collect())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, job| !job.is_expired(now));
        Ok((before - jobs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job() -> NewExportJob {
        NewExportJob::builder()
            .organization_id(Uuid::new_v4())
            .framework_id(Uuid::new_v4())
            .requested_by("tester@example.com")
            .build()
    }

    #[tokio::test]
    async fn claim_increments_attempts_and_locks() {
        let store = InMemoryExportJobStore::new();
        let job = store.create(new_job()).await.unwrap();

        let claimed = store.claim(job.id, "worker-1").await.unwrap();
        let claimed = claimed.claimed().unwrap();
        assert_eq!(claimed.status, ExportStatus::Processing);
        assert_eq!(claimed.attempt_count, 1);
        assert_eq!(claimed.locked_by.as_deref(), Some("worker-1"));
    }

    #[tokio::test]
    async fn second_claim_on_live_lock_is_not_claimable() {
        let store = InMemoryExportJobStore::new();
        let job = store.create(new_job()).await.unwrap();

        assert!(store.claim(job.id, "worker-1").await.unwrap().claimed().is_some());
        assert!(matches!(
            store.claim(job.id, "worker-2").await.unwrap(),
            ClaimOutcome::NotClaimable
        ));
    }

    #[tokio::test]
    async fn stale_lock_is_reclaimable_and_old_worker_loses() {
        let store = InMemoryExportJobStore::with_lock_staleness(Duration::from_millis(0));
        let job = store.create(new_job()).await.unwrap();

        assert!(store.claim(job.id, "worker-1").await.unwrap().claimed().is_some());

        // Zero staleness: the lock is immediately stale for the next claimer.
        let reclaimed = store.claim(job.id, "worker-2").await.unwrap().claimed().unwrap();
        assert_eq!(reclaimed.attempt_count, 2);
        assert_eq!(reclaimed.locked_by.as_deref(), Some("worker-2"));

        // The original worker's finalization must not land.
        let artifact = PublishedArtifact {
            file_url: "https://blobs.test/a.zip".to_string(),
            file_size: 1,
            metadata: serde_json::Value::Null,
        };
        assert!(matches!(
            store.complete(job.id, "worker-1", &artifact).await,
            Err(StoreError::LockLost(_))
        ));

        // The reclaiming worker's does.
        store.complete(job.id, "worker-2", &artifact).await.unwrap();
        assert_eq!(store.get(job.id).await.unwrap().status, ExportStatus::Completed);
    }

    #[tokio::test]
    async fn progress_never_regresses() {
        let store = InMemoryExportJobStore::new();
        let job = store.create(new_job()).await.unwrap();
        store.claim(job.id, "worker-1").await.unwrap();

        store.update_progress(job.id, 50).await.unwrap();
        store.update_progress(job.id, 30).await.unwrap();
        assert_eq!(store.get(job.id).await.unwrap().progress, 50);

        store.update_progress(job.id, 80).await.unwrap();
        assert_eq!(store.get(job.id).await.unwrap().progress, 80);
    }

    #[tokio::test]
    async fn schedule_retry_releases_lock_and_keeps_attempts() {
        let store = InMemoryExportJobStore::new();
        let job = store.create(new_job()).await.unwrap();
        store.claim(job.id, "worker-1").await.unwrap();

        store
            .schedule_retry(job.id, "worker-1", Duration::from_secs(60), "downstream 503")
            .await
            .unwrap();

        let job = store.get(job.id).await.unwrap();
        assert_eq!(job.status, ExportStatus::Pending);
        assert_eq!(job.attempt_count, 1);
        assert!(job.locked_by.is_none());
        assert!(job.next_run_at.is_some());
        assert_eq!(job.last_error.as_deref(), Some("downstream 503"));
    }

    #[tokio::test]
    async fn rescheduled_job_is_not_due_until_delay_elapses() {
        let store = InMemoryExportJobStore::new();
        let job = store.create(new_job()).await.unwrap();
        store.claim(job.id, "worker-1").await.unwrap();
        store
            .schedule_retry(job.id, "worker-1", Duration::from_secs(60), "err")
            .await
            .unwrap();

        assert!(matches!(
            store.claim(job.id, "worker-1").await.unwrap(),
            ClaimOutcome::NotClaimable
        ));
        assert!(store.due_jobs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_jobs_are_unreadable_and_purgeable() {
        let store = InMemoryExportJobStore::new();
        let job = store
            .create(
                NewExportJob::builder()
                    .organization_id(Uuid::new_v4())
                    .framework_id(Uuid::new_v4())
                    .requested_by("tester@example.com")
                    .retention(chrono::Duration::zero())
                    .build(),
            )
            .await
            .unwrap();

        assert!(matches!(
            store.get(job.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.snapshot(job.id).is_none());
    }

    #[tokio::test]
    async fn due_jobs_orders_oldest_first() {
        let store = InMemoryExportJobStore::new();
        let first = store.create(new_job()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = store.create(new_job()).await.unwrap();

        let due = store.due_jobs(10).await.unwrap();
        assert_eq!(due, vec![first.id, second.id]);
    }
}

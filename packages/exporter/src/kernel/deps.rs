//! Dependency container for the export pipeline.
//!
//! All collaborators are trait objects injected at construction, so tests
//! substitute fakes for the database, object store, and data providers.

use std::sync::Arc;
use std::time::Duration;

use super::jobs::{ExportJobStore, JobQueue, RetryPolicy};
use super::traits::{ArchiveBuilder, BlobPublisher, EvidenceProvider};

#[derive(Clone)]
pub struct ExportDeps {
    pub store: Arc<dyn ExportJobStore>,
    pub provider: Arc<dyn EvidenceProvider>,
    pub archiver: Arc<dyn ArchiveBuilder>,
    pub publisher: Arc<dyn BlobPublisher>,
    pub queue: Arc<dyn JobQueue>,
    pub retry: RetryPolicy,
    /// Lifetime of signed download URLs.
    pub signed_url_ttl: Duration,
    /// Wall-clock bound on a single pipeline run.
    pub job_timeout: Duration,
    /// How long finished jobs stay readable.
    pub retention: chrono::Duration,
}

impl ExportDeps {
    /// Create a container with default tunables (3 attempts, 1 h URLs,
    /// 10 min runs, 7 day retention).
    pub fn new(
        store: Arc<dyn ExportJobStore>,
        provider: Arc<dyn EvidenceProvider>,
        archiver: Arc<dyn ArchiveBuilder>,
        publisher: Arc<dyn BlobPublisher>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            store,
            provider,
            archiver,
            publisher,
            queue,
            retry: RetryPolicy::default(),
            signed_url_ttl: Duration::from_secs(3600),
            job_timeout: Duration::from_secs(600),
            retention: chrono::Duration::days(7),
        }
    }
}

//! Export pipeline orchestration.
//!
//! Drives a claimed job through data gathering, manifest assembly, archive
//! construction, and publication. Stage order is fixed and each stage
//! reports a fixed progress checkpoint, so a stalled run can be located
//! from the job row alone.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::kernel::jobs::{ErrorKind, ExportJob, ExportJobStore, PublishedArtifact, StoreError};
use crate::kernel::traits::{
    ArchiveBuilder, BlobPublisher, EvidenceProvider, NamedPayload, ProviderError,
};
use crate::kernel::ExportDeps;

use super::models::{EvidenceBundle, ExportManifest, ExportStatistics};

/// Failure of a pipeline run, carrying its retry classification.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export job {0} not found")]
    JobNotFound(Uuid),
    #[error("framework {0} not found")]
    FrameworkNotFound(Uuid),
    #[error("failed to fetch {category}: {source}")]
    Fetch {
        category: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to build archive: {0}")]
    Archive(#[source] anyhow::Error),
    #[error("failed to publish bundle: {0}")]
    Publish(#[source] anyhow::Error),
    #[error("job store failure: {0}")]
    Store(#[from] StoreError),
    #[error("export timed out after {0:?}")]
    Timeout(Duration),
}

impl ExportError {
    /// Whether a later attempt can succeed without operator intervention.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::JobNotFound(_) | ExportError::FrameworkNotFound(_) => {
                ErrorKind::NonRetryable
            }
            // The job row vanished mid-run; no retry can bring it back.
            ExportError::Store(StoreError::NotFound(_)) => ErrorKind::NonRetryable,
            _ => ErrorKind::Retryable,
        }
    }
}

// Progress checkpoints, one per stage.
const PROGRESS_CONTROLS: i32 = 10;
const PROGRESS_EVIDENCE: i32 = 30;
const PROGRESS_TASKS: i32 = 50;
const PROGRESS_POLICIES: i32 = 60;
const PROGRESS_AUTOMATION: i32 = 70;
const PROGRESS_SCORES: i32 = 80;
const PROGRESS_ARCHIVED: i32 = 90;

pub struct ExportPipeline {
    store: Arc<dyn ExportJobStore>,
    provider: Arc<dyn EvidenceProvider>,
    archiver: Arc<dyn ArchiveBuilder>,
    publisher: Arc<dyn BlobPublisher>,
    signed_url_ttl: Duration,
}

impl ExportPipeline {
    pub fn new(
        store: Arc<dyn ExportJobStore>,
        provider: Arc<dyn EvidenceProvider>,
        archiver: Arc<dyn ArchiveBuilder>,
        publisher: Arc<dyn BlobPublisher>,
        signed_url_ttl: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            archiver,
            publisher,
            signed_url_ttl,
        }
    }

    pub fn from_deps(deps: &ExportDeps) -> Self {
        Self::new(
            deps.store.clone(),
            deps.provider.clone(),
            deps.archiver.clone(),
            deps.publisher.clone(),
            deps.signed_url_ttl,
        )
    }

    /// Run the pipeline for a claimed job. Callers must hold the job's lock
    /// under `worker_id`.
    pub async fn run(
        &self,
        job: &ExportJob,
        worker_id: &str,
    ) -> Result<PublishedArtifact, ExportError> {
        // A crash between publish and the caller observing completion leaves
        // a completed row behind; hand back the recorded artifact untouched.
        if let Some(artifact) = job.artifact() {
            debug!(job_id = %job.id, "job already completed, returning recorded artifact");
            return Ok(artifact);
        }

        let bundle = self.gather(job).await?;
        let statistics = ExportStatistics::from_bundle(&bundle);
        let manifest = ExportManifest::new(
            job.id,
            job.organization_id,
            job.framework_id,
            statistics.clone(),
        );

        let payloads = build_payloads(&manifest, &bundle)?;
        let archive = self
            .archiver
            .build(&payloads)
            .await
            .map_err(ExportError::Archive)?;
        self.store.update_progress(job.id, PROGRESS_ARCHIVED).await?;

        let path = bundle_path(job);
        self.publisher
            .upload(&path, &archive, "application/zip")
            .await
            .map_err(ExportError::Publish)?;
        let url = self
            .publisher
            .signed_url(&path, self.signed_url_ttl)
            .await
            .map_err(ExportError::Publish)?;

        let metadata = serde_json::json!({
            "path": path,
            "contentType": "application/zip",
            "entries": payloads.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            "sha256": format!("{:x}", Sha256::digest(&archive)),
            "statistics": statistics,
        });
        let artifact = PublishedArtifact {
            file_url: url,
            file_size: archive.len() as i64,
            metadata,
        };

        self.store.complete(job.id, worker_id, &artifact).await?;
        info!(
            job_id = %job.id,
            organization_id = %job.organization_id,
            framework_id = %job.framework_id,
            size = artifact.file_size,
            "export bundle published"
        );
        Ok(artifact)
    }

    async fn gather(&self, job: &ExportJob) -> Result<EvidenceBundle, ExportError> {
        let org = job.organization_id;
        let fw = job.framework_id;

        let controls = self
            .stage(job, "controls", PROGRESS_CONTROLS, self.provider.fetch_controls(org, fw))
            .await?;
        let evidence = self
            .stage(job, "evidence", PROGRESS_EVIDENCE, self.provider.fetch_evidence(org, fw))
            .await?;
        let tasks = self
            .stage(job, "tasks", PROGRESS_TASKS, self.provider.fetch_tasks(org, fw))
            .await?;
        let policies = self
            .stage(job, "policies", PROGRESS_POLICIES, self.provider.fetch_policies(org, fw))
            .await?;
        let automation_log = self
            .stage(
                job,
                "automation_log",
                PROGRESS_AUTOMATION,
                self.provider.fetch_automation_log(org, fw),
            )
            .await?;
        let score_history = self
            .stage(
                job,
                "score_history",
                PROGRESS_SCORES,
                self.provider.fetch_score_history(org, fw),
            )
            .await?;

        Ok(EvidenceBundle {
            controls,
            evidence,
            tasks,
            policies,
            automation_log,
            score_history,
        })
    }

    async fn stage(
        &self,
        job: &ExportJob,
        category: &'static str,
        checkpoint: i32,
        fetch: impl Future<Output = Result<Vec<serde_json::Value>, ProviderError>> + Send,
    ) -> Result<Vec<serde_json::Value>, ExportError> {
        let records = fetch.await.map_err(|e| match e {
            ProviderError::FrameworkNotFound(id) => ExportError::FrameworkNotFound(id),
            ProviderError::Unavailable(source) => ExportError::Fetch { category, source },
        })?;

        self.store.update_progress(job.id, checkpoint).await?;
        debug!(
            job_id = %job.id,
            category,
            count = records.len(),
            progress = checkpoint,
            "stage complete"
        );
        Ok(records)
    }
}

/// Deterministic, collision-free storage path for a job's bundle. Uses the
/// submission date so retries land on the same path.
pub fn bundle_path(job: &ExportJob) -> String {
    format!(
        "exports/{}/{}/{}/{}.zip",
        job.organization_id,
        job.framework_id,
        job.created_at.format("%Y-%m-%d"),
        job.id
    )
}

fn build_payloads(
    manifest: &ExportManifest,
    bundle: &EvidenceBundle,
) -> Result<Vec<NamedPayload>, ExportError> {
    Ok(vec![
        NamedPayload::new("manifest.json", to_json(manifest)?),
        NamedPayload::new("controls.json", to_json(&bundle.controls)?),
        NamedPayload::new("evidence.json", to_json(&bundle.evidence)?),
        NamedPayload::new("tasks.json", to_json(&bundle.tasks)?),
        NamedPayload::new("policies.json", to_json(&bundle.policies)?),
        NamedPayload::new("automation_log.json", to_json(&bundle.automation_log)?),
        NamedPayload::new("score_history.json", to_json(&bundle.score_history)?),
        NamedPayload::new("summary.txt", manifest.summary_text().into_bytes()),
    ])
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, ExportError> {
    serde_json::to_vec_pretty(value).map_err(|e| ExportError::Archive(e.into()))
}

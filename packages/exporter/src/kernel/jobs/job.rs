//! Export job model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::id::db_id;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "export_status", rename_all = "snake_case")]
pub enum ExportStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ExportStatus {
    /// Whether the job has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStatus::Completed | ExportStatus::Failed)
    }
}

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient error - retried while attempts remain
    Retryable,
    /// Permanent error - fails the job immediately
    NonRetryable,
}

impl ErrorKind {
    /// Whether this error kind should trigger a retry
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable)
    }
}

// ============================================================================
// Job Model
// ============================================================================

/// Fields supplied when submitting a new export job.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewExportJob {
    pub organization_id: Uuid,
    pub framework_id: Uuid,
    pub requested_by: String,
    /// Retention window; the job becomes unreadable once it elapses.
    #[builder(default = chrono::Duration::days(7))]
    pub retention: chrono::Duration,
}

/// Artifact facts recorded when a job completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    pub file_url: String,
    pub file_size: i64,
    pub metadata: serde_json::Value,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: Uuid,

    // Core identity
    pub organization_id: Uuid,
    pub framework_id: Uuid,
    pub requested_by: String,

    // State
    pub status: ExportStatus,
    pub progress: i32,
    pub attempt_count: i32,

    // Lock management
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,

    // Retry scheduling
    pub next_run_at: Option<DateTime<Utc>>,

    // Artifact (populated on completion)
    pub file_url: Option<String>,
    pub file_size: Option<i64>,
    pub metadata: Option<serde_json::Value>,

    // Error tracking
    pub last_error: Option<String>,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl ExportJob {
    /// Materialize a fresh pending job from submission fields.
    pub fn from_new(new: NewExportJob) -> Self {
        let now = Utc::now();
        Self {
            id: db_id(),
            organization_id: new.organization_id,
            framework_id: new.framework_id,
            requested_by: new.requested_by,
            status: ExportStatus::Pending,
            progress: 0,
            attempt_count: 0,
            locked_by: None,
            locked_at: None,
            next_run_at: None,
            file_url: None,
            file_size: None,
            metadata: None,
            last_error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            expires_at: now + new.retention,
        }
    }

    /// Whether a scan should hand this job to a worker as of `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ExportStatus::Pending && self.next_run_at.map_or(true, |at| at <= now)
    }

    /// Whether a live lock exists as of `now`. A lock older than `staleness`
    /// belongs to a presumed-crashed worker and does not count.
    pub fn lock_is_live(&self, now: DateTime<Utc>, staleness: chrono::Duration) -> bool {
        self.status == ExportStatus::Processing
            && self.locked_at.map_or(false, |at| now - at < staleness)
    }

    /// The recorded artifact, when the job has already completed.
    pub fn artifact(&self) -> Option<PublishedArtifact> {
        match (self.status, &self.file_url) {
            (ExportStatus::Completed, Some(url)) => Some(PublishedArtifact {
                file_url: url.clone(),
                file_size: self.file_size.unwrap_or(0),
                metadata: self.metadata.clone().unwrap_or(serde_json::Value::Null),
            }),
            _ => None,
        }
    }

    /// Whether the retention window has elapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

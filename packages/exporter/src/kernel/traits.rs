//! Trait abstractions for the pipeline's external collaborators.
//!
//! The pipeline only talks to these traits; concrete adapters live next to
//! them ([`crate::kernel::zip_archive`], [`crate::kernel::local_publisher`])
//! or in domain data modules.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Errors surfaced by evidence providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The framework does not exist; retrying cannot succeed.
    #[error("framework {0} not found")]
    FrameworkNotFound(Uuid),
    /// The backing store is unreachable or returned a transient fault.
    #[error("provider unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

/// Fetches domain records for an organization/framework pair.
///
/// Records are opaque JSON documents. The pipeline only inspects the
/// `status` field of control records when deriving statistics.
#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    async fn fetch_controls(
        &self,
        organization_id: Uuid,
        framework_id: Uuid,
    ) -> Result<Vec<serde_json::Value>, ProviderError>;

    async fn fetch_evidence(
        &self,
        organization_id: Uuid,
        framework_id: Uuid,
    ) -> Result<Vec<serde_json::Value>, ProviderError>;

    async fn fetch_tasks(
        &self,
        organization_id: Uuid,
        framework_id: Uuid,
    ) -> Result<Vec<serde_json::Value>, ProviderError>;

    async fn fetch_policies(
        &self,
        organization_id: Uuid,
        framework_id: Uuid,
    ) -> Result<Vec<serde_json::Value>, ProviderError>;

    async fn fetch_automation_log(
        &self,
        organization_id: Uuid,
        framework_id: Uuid,
    ) -> Result<Vec<serde_json::Value>, ProviderError>;

    async fn fetch_score_history(
        &self,
        organization_id: Uuid,
        framework_id: Uuid,
    ) -> Result<Vec<serde_json::Value>, ProviderError>;
}

/// A named byte payload destined for the bundle.
#[derive(Debug, Clone)]
pub struct NamedPayload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl NamedPayload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Serializes named payloads into a single downloadable bundle.
#[async_trait]
pub trait ArchiveBuilder: Send + Sync {
    async fn build(&self, payloads: &[NamedPayload]) -> Result<Vec<u8>>;
}

/// Durably stores byte buffers and issues time-limited retrieval URLs.
#[async_trait]
pub trait BlobPublisher: Send + Sync {
    async fn upload(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()>;

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String>;
}

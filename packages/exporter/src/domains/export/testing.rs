//! Test doubles for the pipeline's collaborators.
//!
//! Kept in the library so unit tests, integration tests, and downstream
//! crates can exercise the pipeline without a database or object store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::kernel::jobs::{InMemoryExportJobStore, InProcessJobQueue, RetryPolicy};
use crate::kernel::traits::{BlobPublisher, EvidenceProvider, ProviderError};
use crate::kernel::{ExportDeps, ZipArchiveBuilder};

/// Scripted provider returning fixed record sets.
pub struct StaticEvidenceProvider {
    pub controls: Vec<Value>,
    pub evidence: Vec<Value>,
    pub tasks: Vec<Value>,
    pub policies: Vec<Value>,
    pub automation_log: Vec<Value>,
    pub score_history: Vec<Value>,
    missing_framework: Option<Uuid>,
    fetch_calls: AtomicUsize,
}

impl Default for StaticEvidenceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticEvidenceProvider {
    pub fn new() -> Self {
        Self {
            controls: Vec::new(),
            evidence: Vec::new(),
            tasks: Vec::new(),
            policies: Vec::new(),
            automation_log: Vec::new(),
            score_history: Vec::new(),
            missing_framework: None,
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// Generate simple records: `controls` controls of which `satisfied`
    /// carry a satisfied status, plus the given counts per category.
    pub fn with_counts(
        controls: usize,
        satisfied: usize,
        evidence: usize,
        tasks: usize,
        policies: usize,
    ) -> Self {
        let mut provider = Self::new();
        provider.controls = (0..controls)
            .map(|i| {
                json!({
                    "id": i,
                    "name": format!("control-{i}"),
                    "status": if i < satisfied { "satisfied" } else { "unsatisfied" },
                })
            })
            .collect();
        provider.evidence = (0..evidence).map(|i| json!({"id": i})).collect();
        provider.tasks = (0..tasks).map(|i| json!({"id": i})).collect();
        provider.policies = (0..policies).map(|i| json!({"id": i})).collect();
        provider
    }

    /// Report `FrameworkNotFound` for the given framework id.
    pub fn fail_framework(mut self, framework_id: Uuid) -> Self {
        self.missing_framework = Some(framework_id);
        self
    }

    /// Total provider calls made, across all categories.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn fetch(&self, framework_id: Uuid, records: &[Value]) -> Result<Vec<Value>, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.missing_framework == Some(framework_id) {
            return Err(ProviderError::FrameworkNotFound(framework_id));
        }
        Ok(records.to_vec())
    }
}

#[async_trait]
impl EvidenceProvider for StaticEvidenceProvider {
    async fn fetch_controls(&self, _org: Uuid, framework_id: Uuid) -> Result<Vec<Value>, ProviderError> {
        self.fetch(framework_id, &self.controls)
    }

    async fn fetch_evidence(&self, _org: Uuid, framework_id: Uuid) -> Result<Vec<Value>, ProviderError> {
        self.fetch(framework_id, &self.evidence)
    }

    async fn fetch_tasks(&self, _org: Uuid, framework_id: Uuid) -> Result<Vec<Value>, ProviderError> {
        self.fetch(framework_id, &self.tasks)
    }

    async fn fetch_policies(&self, _org: Uuid, framework_id: Uuid) -> Result<Vec<Value>, ProviderError> {
        self.fetch(framework_id, &self.policies)
    }

    async fn fetch_automation_log(&self, _org: Uuid, framework_id: Uuid) -> Result<Vec<Value>, ProviderError> {
        self.fetch(framework_id, &self.automation_log)
    }

    async fn fetch_score_history(&self, _org: Uuid, framework_id: Uuid) -> Result<Vec<Value>, ProviderError> {
        self.fetch(framework_id, &self.score_history)
    }
}

/// Publisher storing blobs in memory; can be scripted to fail uploads.
pub struct MemoryBlobPublisher {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    failures_remaining: AtomicUsize,
    upload_calls: AtomicUsize,
}

impl Default for MemoryBlobPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBlobPublisher {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            failures_remaining: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
        }
    }

    /// Force the next `n` uploads to fail with a transient error.
    pub fn fail_next_uploads(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Successful uploads so far.
    pub fn upload_count(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }
}

#[async_trait]
impl BlobPublisher for MemoryBlobPublisher {
    async fn upload(&self, path: &str, bytes: &[u8], _content_type: &str) -> anyhow::Result<()> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("storage unavailable"));
        }

        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> anyhow::Result<String> {
        if self.blob(path).is_none() {
            return Err(anyhow!("no blob stored at {path}"));
        }
        Ok(format!(
            "https://blobs.test/{path}?sig=fixed&ttl={}",
            ttl.as_secs()
        ))
    }
}

/// Wire up deps over the in-memory store, zip archiver, and the given
/// provider/publisher fakes. Retries are configured with zero backoff so
/// rescheduled jobs are immediately claimable again.
pub fn test_deps(
    provider: Arc<StaticEvidenceProvider>,
    publisher: Arc<MemoryBlobPublisher>,
) -> (ExportDeps, Arc<InMemoryExportJobStore>, UnboundedReceiver<Uuid>) {
    let store = Arc::new(InMemoryExportJobStore::new());
    let (queue, queue_rx) = InProcessJobQueue::new();

    let mut deps = ExportDeps::new(
        store.clone(),
        provider,
        Arc::new(ZipArchiveBuilder),
        publisher,
        Arc::new(queue),
    );
    deps.retry = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::ZERO,
        cap_delay: Duration::ZERO,
        jitter_window: Duration::ZERO,
    };

    (deps, store, queue_rx)
}

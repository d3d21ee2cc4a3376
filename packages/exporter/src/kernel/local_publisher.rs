//! Filesystem-backed blob publisher for development and tests.
//!
//! Production deployments implement [`BlobPublisher`] against their object
//! store; this adapter keeps the pipeline runnable without one.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use super::traits::BlobPublisher;

pub struct LocalBlobPublisher {
    root: PathBuf,
}

impl LocalBlobPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn absolute(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl BlobPublisher for LocalBlobPublisher {
    async fn upload(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
        let target = self.absolute(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .with_context(|| format!("failed to write {}", target.display()))
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String> {
        let target = self.absolute(path);
        if !tokio::fs::try_exists(&target).await? {
            bail!("no blob stored at {path}");
        }

        let expires = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        Ok(format!(
            "file://{}?expires={}",
            target.display(),
            expires.timestamp()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_sign_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = LocalBlobPublisher::new(dir.path());

        publisher
            .upload("exports/a/b/bundle.zip", b"bytes", "application/zip")
            .await
            .unwrap();

        let url = publisher
            .signed_url("exports/a/b/bundle.zip", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.contains("bundle.zip"));
        assert!(url.contains("expires="));

        let stored = tokio::fs::read(dir.path().join("exports/a/b/bundle.zip"))
            .await
            .unwrap();
        assert_eq!(stored, b"bytes");
    }

    #[tokio::test]
    async fn signing_a_missing_blob_fails() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = LocalBlobPublisher::new(dir.path());

        assert!(publisher
            .signed_url("missing.zip", Duration::from_secs(60))
            .await
            .is_err());
    }
}

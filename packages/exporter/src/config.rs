use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Root directory for the filesystem blob publisher.
    pub storage_root: PathBuf,
    /// Lifetime of signed download URLs.
    pub signed_url_ttl: Duration,
    /// How long finished jobs stay readable before purging.
    pub retention: chrono::Duration,
    /// How often the worker scans for due jobs.
    pub poll_interval: Duration,
    /// Wall-clock bound on a single pipeline run; also the lock staleness
    /// threshold after which another worker may reclaim a job.
    pub job_timeout: Duration,
    pub max_attempts: i32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            storage_root: env::var("EXPORT_STORAGE_ROOT")
                .unwrap_or_else(|_| "./exports".to_string())
                .into(),
            signed_url_ttl: Duration::from_secs(
                env::var("SIGNED_URL_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .context("SIGNED_URL_TTL_SECS must be a valid number")?,
            ),
            retention: chrono::Duration::days(
                env::var("EXPORT_RETENTION_DAYS")
                    .unwrap_or_else(|_| "7".to_string())
                    .parse()
                    .context("EXPORT_RETENTION_DAYS must be a valid number")?,
            ),
            poll_interval: Duration::from_secs(
                env::var("WORKER_POLL_INTERVAL_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .context("WORKER_POLL_INTERVAL_SECS must be a valid number")?,
            ),
            job_timeout: Duration::from_secs(
                env::var("JOB_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .context("JOB_TIMEOUT_SECS must be a valid number")?,
            ),
            max_attempts: env::var("EXPORT_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("EXPORT_MAX_ATTEMPTS must be a valid number")?,
        })
    }
}

// Main entry point for the export worker

use std::sync::Arc;

use anyhow::{Context, Result};
use export_core::domains::export::data::PgEvidenceProvider;
use export_core::domains::export::{ExportWorker, ExportWorkerConfig};
use export_core::kernel::jobs::{InProcessJobQueue, PostgresExportJobStore, RetryPolicy};
use export_core::kernel::{ExportDeps, LocalBlobPublisher, ZipArchiveBuilder};
use export_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,export_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting audit evidence export worker");

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let store = Arc::new(PostgresExportJobStore::with_lock_staleness(
        pool.clone(),
        config.job_timeout,
    ));
    let provider = Arc::new(PgEvidenceProvider::new(pool.clone()));
    let (queue, queue_rx) = InProcessJobQueue::new();

    let mut deps = ExportDeps::new(
        store,
        provider,
        Arc::new(ZipArchiveBuilder),
        Arc::new(LocalBlobPublisher::new(config.storage_root.clone())),
        Arc::new(queue),
    );
    deps.retry = RetryPolicy::with_max_attempts(config.max_attempts);
    deps.signed_url_ttl = config.signed_url_ttl;
    deps.job_timeout = config.job_timeout;
    deps.retention = config.retention;

    let worker_config = ExportWorkerConfig {
        poll_interval: config.poll_interval,
        max_attempts: config.max_attempts,
        ..Default::default()
    };
    let worker = ExportWorker::with_config(deps, worker_config).with_queue(queue_rx);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        signal_token.cancel();
    });

    worker.run(shutdown).await;
    Ok(())
}

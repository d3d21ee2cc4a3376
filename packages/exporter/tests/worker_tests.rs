// Worker loop behavior: push-path and scan-path admission both drive
// submitted jobs to completion.

mod common;

use std::time::Duration;

use common::Harness;
use export_core::domains::export::testing::StaticEvidenceProvider;
use export_core::domains::export::{ExportWorker, ExportWorkerConfig};
use export_core::kernel::jobs::ExportStatus;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn wait_for_status(
    harness: &Harness,
    job_id: Uuid,
    expected: ExportStatus,
) -> Result<(), String> {
    for _ in 0..200 {
        if let Some(job) = harness.store.snapshot(job_id) {
            if job.status == expected {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Err(format!("job {job_id} never reached {expected:?}"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_processes_jobs_from_the_push_queue() {
    let mut harness = Harness::new(StaticEvidenceProvider::with_counts(4, 2, 1, 1, 0));

    let config = ExportWorkerConfig {
        worker_id: "push-worker".to_string(),
        poll_interval: Duration::from_secs(30),
        ..Default::default()
    };
    let queue_rx = std::mem::replace(&mut harness.queue_rx, tokio::sync::mpsc::unbounded_channel().1);
    let worker = ExportWorker::with_config(harness.deps.clone(), config).with_queue(queue_rx);

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    // The long poll interval means only the push path can deliver this fast.
    let job_id = harness.submit().await;
    wait_for_status(&harness, job_id, ExportStatus::Completed)
        .await
        .unwrap();

    let job = harness.store.snapshot(job_id).unwrap();
    assert_eq!(job.locked_by, None);
    assert!(job.file_url.is_some());

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_scan_path_picks_up_jobs_without_a_queue() {
    let harness = Harness::new(StaticEvidenceProvider::with_counts(1, 1, 0, 0, 0));
    let job_id = harness.submit().await;

    let config = ExportWorkerConfig {
        worker_id: "scan-worker".to_string(),
        poll_interval: Duration::from_millis(20),
        ..Default::default()
    };
    // No queue receiver attached: the scan is the only admission path.
    let worker = ExportWorker::with_config(harness.deps.clone(), config);

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    wait_for_status(&harness, job_id, ExportStatus::Completed)
        .await
        .unwrap();

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_retries_until_the_publisher_recovers() {
    let harness = Harness::new(StaticEvidenceProvider::with_counts(2, 1, 0, 0, 0));
    harness.publisher.fail_next_uploads(2);
    let job_id = harness.submit().await;

    let config = ExportWorkerConfig {
        worker_id: "retry-worker".to_string(),
        poll_interval: Duration::from_millis(20),
        ..Default::default()
    };
    let worker = ExportWorker::with_config(harness.deps.clone(), config);

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    wait_for_status(&harness, job_id, ExportStatus::Completed)
        .await
        .unwrap();

    let job = harness.store.snapshot(job_id).unwrap();
    assert_eq!(job.attempt_count, 3);
    // Three full attempts, six provider calls each.
    assert_eq!(harness.provider.fetch_calls(), 18);

    shutdown.cancel();
    handle.await.unwrap();
}

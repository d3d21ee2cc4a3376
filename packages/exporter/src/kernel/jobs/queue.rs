//! Push-path admission queue.
//!
//! Submission enqueues the job id so an idle worker can pick it up without
//! waiting for the next poll tick. The periodic scan remains the system of
//! record; a lost message only costs latency.

use tokio::sync::mpsc;
use uuid::Uuid;

pub trait JobQueue: Send + Sync {
    /// Hand a job id to any listening worker. Best effort.
    fn enqueue(&self, job_id: Uuid);
}

/// In-process queue over a tokio channel. Deployments with an external
/// broker implement [`JobQueue`] against it instead.
pub struct InProcessJobQueue {
    tx: mpsc::UnboundedSender<Uuid>,
}

impl InProcessJobQueue {
    /// Create the queue and the receiver handed to the worker loop.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Uuid>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl JobQueue for InProcessJobQueue {
    fn enqueue(&self, job_id: Uuid) {
        // A closed channel means no worker is listening; the scan path
        // still picks the job up.
        let _ = self.tx.send(job_id);
    }
}

/// Queue for deployments that rely on the scan path alone.
pub struct NullJobQueue;

impl JobQueue for NullJobQueue {
    fn enqueue(&self, _job_id: Uuid) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueued_ids_reach_the_receiver() {
        let (queue, mut rx) = InProcessJobQueue::new();
        let id = Uuid::new_v4();

        queue.enqueue(id);
        assert_eq!(rx.recv().await, Some(id));
    }

    #[tokio::test]
    async fn enqueue_after_receiver_drop_does_not_panic() {
        let (queue, rx) = InProcessJobQueue::new();
        drop(rx);
        queue.enqueue(Uuid::new_v4());
    }
}

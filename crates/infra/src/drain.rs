//! On-demand drain worker.
//!
//! Draining is pull-based: an operator (or a scheduler acting as one) asks
//! for up to N jobs to be processed now. The worker claims a bounded batch,
//! executes each job through a [`JobHandler`], and records the terminal
//! status per job. One defective job never aborts the rest of its batch.

use std::sync::Arc;
use std::time::Duration;

use orderflow_core::WorkerId;
use tracing::{error, info, warn};

use crate::job_queue::{JobQueue, WebhookJob};

/// Upper bound on one drain batch regardless of what the caller asks for.
pub const MAX_DRAIN_BATCH: usize = 100;

/// Executes one claimed job. Implementations live at the application edge;
/// an `Err` marks the job failed with the error's display text.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, job: &WebhookJob) -> anyhow::Result<()>;
}

/// Outcome of one drain invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DrainReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct DrainWorker {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    stale_after: Duration,
}

impl DrainWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        stale_after: Duration,
    ) -> Self {
        Self {
            queue,
            handler,
            stale_after,
        }
    }

    /// Claim and execute up to `max_jobs` jobs (clamped to
    /// [`MAX_DRAIN_BATCH`]) as `worker`.
    ///
    /// Status updates are per job: a handler failure marks that job failed
    /// and the batch continues. A storage failure while recording a status
    /// is logged and counted as failed; the stale-claim rule makes the job
    /// reclaimable later.
    pub async fn drain(
        &self,
        worker: &WorkerId,
        max_jobs: usize,
    ) -> Result<DrainReport, crate::job_queue::QueueError> {
        let max = max_jobs.min(MAX_DRAIN_BATCH);
        let jobs = self.queue.claim(worker, max, self.stale_after).await?;

        let mut report = DrainReport {
            processed: jobs.len(),
            ..DrainReport::default()
        };

        for job in &jobs {
            match self.handler.execute(job).await {
                Ok(()) => match self.queue.complete(job.id).await {
                    Ok(()) => {
                        report.succeeded += 1;
                        info!(job_id = %job.id, delivery_id = %job.delivery_id, "job done");
                    }
                    Err(err) => {
                        report.failed += 1;
                        error!(job_id = %job.id, error = %err, "failed to mark job done");
                    }
                },
                Err(err) => {
                    report.failed += 1;
                    warn!(job_id = %job.id, error = %err, "job execution failed");
                    if let Err(store_err) = self.queue.fail(job.id, &err.to_string()).await {
                        error!(job_id = %job.id, error = %store_err, "failed to mark job failed");
                    }
                }
            }
        }

        info!(
            worker = %worker,
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            "drain finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use orderflow_core::{DeliveryId, JobStatus, OrderId, ShopDomain, WebhookTopic};

    use crate::job_queue::{InMemoryJobQueue, NewJob};

    const STALE: Duration = Duration::from_secs(300);

    fn new_job(delivery: &str, order_id: Option<i64>) -> NewJob {
        NewJob {
            delivery_id: DeliveryId::from(delivery),
            topic: WebhookTopic::OrderCreated,
            shop_domain: ShopDomain::from("shop.example.com"),
            order_id: order_id.map(OrderId::new),
            payload: serde_json::json!({"id": order_id}),
        }
    }

    /// Succeeds unless the job carries no order reference.
    struct RequireOrderRef {
        executed: AtomicUsize,
    }

    impl RequireOrderRef {
        fn new() -> Self {
            Self {
                executed: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl JobHandler for RequireOrderRef {
        async fn execute(&self, job: &WebhookJob) -> anyhow::Result<()> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            if job.order_id.is_none() {
                anyhow::bail!("no order reference in payload");
            }
            Ok(())
        }
    }

    fn worker(queue: Arc<InMemoryJobQueue>, handler: Arc<RequireOrderRef>) -> DrainWorker {
        DrainWorker::new(queue, handler, STALE)
    }

    #[tokio::test]
    async fn drains_a_batch_and_records_terminal_statuses() {
        let queue = Arc::new(InMemoryJobQueue::new());
        queue.enqueue(new_job("wh-1", Some(1))).await.unwrap();
        queue.enqueue(new_job("wh-2", None)).await.unwrap();
        queue.enqueue(new_job("wh-3", Some(3))).await.unwrap();

        let handler = Arc::new(RequireOrderRef::new());
        let drain = worker(queue.clone(), handler.clone());

        let report = drain.drain(&WorkerId::from("w1"), 10).await.unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(handler.executed.load(Ordering::SeqCst), 3);

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.done, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 0);

        let failed: Vec<_> = queue
            .snapshot()
            .into_iter()
            .filter(|j| j.status == JobStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].delivery_id.as_str(), "wh-2");
        assert_eq!(
            failed[0].last_error.as_deref(),
            Some("no order reference in payload")
        );
    }

    #[tokio::test]
    async fn one_bad_job_does_not_abort_the_batch() {
        let queue = Arc::new(InMemoryJobQueue::new());
        queue.enqueue(new_job("wh-1", None)).await.unwrap();
        queue.enqueue(new_job("wh-2", Some(2))).await.unwrap();

        let drain = worker(queue.clone(), Arc::new(RequireOrderRef::new()));
        let report = drain.drain(&WorkerId::from("w1"), 10).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn drain_respects_the_requested_bound_oldest_first() {
        let queue = Arc::new(InMemoryJobQueue::new());
        queue.enqueue(new_job("wh-1", Some(1))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        queue.enqueue(new_job("wh-2", Some(2))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        queue.enqueue(new_job("wh-3", Some(3))).await.unwrap();

        let drain = worker(queue.clone(), Arc::new(RequireOrderRef::new()));
        let report = drain.drain(&WorkerId::from("w1"), 1).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.succeeded, 1);

        let jobs = queue.snapshot();
        assert_eq!(jobs[0].status, JobStatus::Done);
        assert_eq!(jobs[1].status, JobStatus::Pending);
        assert_eq!(jobs[2].status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn oversized_requests_are_clamped() {
        let queue = Arc::new(InMemoryJobQueue::new());
        for i in 0..(MAX_DRAIN_BATCH + 20) {
            queue
                .enqueue(new_job(&format!("wh-{i}"), Some(i as i64)))
                .await
                .unwrap();
        }

        let drain = worker(queue.clone(), Arc::new(RequireOrderRef::new()));
        let report = drain.drain(&WorkerId::from("w1"), usize::MAX).await.unwrap();
        assert_eq!(report.processed, MAX_DRAIN_BATCH);

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.pending as usize, 20);
    }

    #[tokio::test]
    async fn zero_max_drains_nothing() {
        let queue = Arc::new(InMemoryJobQueue::new());
        queue.enqueue(new_job("wh-1", Some(1))).await.unwrap();

        let drain = worker(queue.clone(), Arc::new(RequireOrderRef::new()));
        let report = drain.drain(&WorkerId::from("w1"), 0).await.unwrap();
        assert_eq!(report, DrainReport::default());
        assert_eq!(queue.counts().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn concurrent_drains_never_share_a_job() {
        let queue = Arc::new(InMemoryJobQueue::new());
        for i in 0..12 {
            queue
                .enqueue(new_job(&format!("wh-{i}"), Some(i)))
                .await
                .unwrap();
        }

        let drain = Arc::new(worker(queue.clone(), Arc::new(RequireOrderRef::new())));
        let mut handles = Vec::new();
        for w in 0..3 {
            let drain = Arc::clone(&drain);
            handles.push(tokio::spawn(async move {
                drain.drain(&WorkerId::from(format!("w{w}")), 12).await.unwrap()
            }));
        }

        let mut processed = 0;
        for handle in handles {
            processed += handle.await.unwrap().processed;
        }
        assert_eq!(processed, 12);
        assert_eq!(queue.counts().await.unwrap().done, 12);
    }
}

//! In-memory job queue for tests/dev.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use orderflow_core::{JobId, JobStatus, WorkerId};

use super::{JobCounts, JobQueue, NewJob, QueueError, WebhookJob};

/// Mutex-guarded map of jobs. The whole claim runs under one lock
/// acquisition, which gives the same exclusivity the Postgres conditional
/// update provides.
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<HashMap<JobId, WebhookJob>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch one job by id. Test hook.
    pub fn get(&self, id: JobId) -> Option<WebhookJob> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    /// All jobs, oldest enqueued first. Test hook.
    pub fn snapshot(&self) -> Vec<WebhookJob> {
        let jobs = self.jobs.lock().unwrap();
        let mut all: Vec<_> = jobs.values().cloned().collect();
        all.sort_by_key(|j| j.enqueued_at);
        all
    }
}

#[async_trait::async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: NewJob) -> Result<JobId, QueueError> {
        let id = JobId::new();
        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(
            id,
            WebhookJob {
                id,
                delivery_id: job.delivery_id,
                topic: job.topic,
                shop_domain: job.shop_domain,
                order_id: job.order_id,
                payload: job.payload,
                status: JobStatus::Pending,
                attempt: 0,
                enqueued_at: Utc::now(),
                last_attempted_at: None,
                claimed_by: None,
                last_error: None,
            },
        );
        Ok(id)
    }

    async fn claim(
        &self,
        worker: &WorkerId,
        max: usize,
        stale_after: Duration,
    ) -> Result<Vec<WebhookJob>, QueueError> {
        let now = Utc::now();
        let stale_cutoff = now - chrono::Duration::from_std(stale_after).unwrap_or_default();
        let mut jobs = self.jobs.lock().unwrap();

        let mut claimable: Vec<(chrono::DateTime<Utc>, JobId)> = jobs
            .values()
            .filter(|j| match j.status {
                JobStatus::Pending => true,
                JobStatus::Processing => {
                    j.last_attempted_at.is_none_or(|t| t <= stale_cutoff)
                }
                JobStatus::Done | JobStatus::Failed => false,
            })
            .map(|j| (j.enqueued_at, j.id))
            .collect();
        claimable.sort_by_key(|&(enqueued_at, _)| enqueued_at);
        claimable.truncate(max);

        let mut claimed = Vec::with_capacity(claimable.len());
        for (_, id) in claimable {
            let job = jobs.get_mut(&id).expect("id collected under this lock");
            job.status = JobStatus::Processing;
            job.attempt += 1;
            job.last_attempted_at = Some(now);
            job.claimed_by = Some(worker.clone());
            claimed.push(job.clone());
        }
        Ok(claimed)
    }

    async fn complete(&self, id: JobId) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if job.status != JobStatus::Processing {
            return Err(QueueError::NotProcessing(id));
        }
        job.status = JobStatus::Done;
        Ok(())
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if job.status != JobStatus::Processing {
            return Err(QueueError::NotProcessing(id));
        }
        job.status = JobStatus::Failed;
        job.last_error = Some(error.to_string());
        Ok(())
    }

    async fn counts(&self) -> Result<JobCounts, QueueError> {
        let jobs = self.jobs.lock().unwrap();
        let mut counts = JobCounts::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Done => counts.done += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderflow_core::{DeliveryId, OrderId, ShopDomain, WebhookTopic};

    fn new_job(delivery: &str) -> NewJob {
        NewJob {
            delivery_id: DeliveryId::from(delivery),
            topic: WebhookTopic::OrderCreated,
            shop_domain: ShopDomain::from("shop.example.com"),
            order_id: Some(OrderId::new(42)),
            payload: serde_json::json!({"id": 42}),
        }
    }

    fn worker(name: &str) -> WorkerId {
        WorkerId::from(name)
    }

    const STALE: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn claim_is_fifo_and_bounded() {
        let queue = InMemoryJobQueue::new();
        let first = queue.enqueue(new_job("wh-1")).await.unwrap();
        // Distinct enqueue instants keep the FIFO assertion meaningful.
        tokio::time::sleep(Duration::from_millis(2)).await;
        queue.enqueue(new_job("wh-2")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        queue.enqueue(new_job("wh-3")).await.unwrap();

        let claimed = queue.claim(&worker("w1"), 1, STALE).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, first);
        assert_eq!(claimed[0].status, JobStatus::Processing);
        assert_eq!(claimed[0].attempt, 1);
        assert_eq!(claimed[0].claimed_by, Some(worker("w1")));

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.processing, 1);
    }

    #[tokio::test]
    async fn claimed_jobs_are_not_claimable_again() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue(new_job("wh-1")).await.unwrap();

        let first = queue.claim(&worker("w1"), 10, STALE).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = queue.claim(&worker("w2"), 10, STALE).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn stale_processing_jobs_are_reclaimable() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue(new_job("wh-1")).await.unwrap();

        let claimed = queue.claim(&worker("w1"), 10, STALE).await.unwrap();
        assert_eq!(claimed.len(), 1);

        // Zero staleness threshold makes the fresh claim immediately stale.
        let reclaimed = queue
            .claim(&worker("w2"), 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, claimed[0].id);
        assert_eq!(reclaimed[0].attempt, 2);
        assert_eq!(reclaimed[0].claimed_by, Some(worker("w2")));
    }

    #[tokio::test]
    async fn complete_and_fail_are_terminal() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue(new_job("wh-1")).await.unwrap();
        queue.enqueue(new_job("wh-2")).await.unwrap();

        let claimed = queue.claim(&worker("w1"), 2, STALE).await.unwrap();
        queue.complete(claimed[0].id).await.unwrap();
        queue.fail(claimed[1].id, "order lookup failed").await.unwrap();

        assert!(queue.claim(&worker("w2"), 10, STALE).await.unwrap().is_empty());
        let failed = queue.get(claimed[1].id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("order lookup failed"));

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.done, 1);
        assert_eq!(counts.failed, 1);
    }

    #[tokio::test]
    async fn unknown_job_id_is_not_found() {
        let queue = InMemoryJobQueue::new();
        let err = queue.complete(JobId::new()).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn complete_and_fail_require_a_live_claim() {
        let queue = InMemoryJobQueue::new();
        let id = queue.enqueue(new_job("wh-1")).await.unwrap();

        // Unclaimed jobs have no terminal transition.
        let err = queue.complete(id).await.unwrap_err();
        assert!(matches!(err, QueueError::NotProcessing(_)));
        let err = queue.fail(id, "spurious").await.unwrap_err();
        assert!(matches!(err, QueueError::NotProcessing(_)));
        assert_eq!(queue.get(id).unwrap().status, JobStatus::Pending);

        let claimed = queue.claim(&worker("w1"), 1, STALE).await.unwrap();
        queue.complete(claimed[0].id).await.unwrap();

        // Terminal states stay terminal.
        let err = queue.fail(id, "late failure").await.unwrap_err();
        assert!(matches!(err, QueueError::NotProcessing(_)));
        assert_eq!(queue.get(id).unwrap().status, JobStatus::Done);
        assert_eq!(queue.get(id).unwrap().last_error, None);
    }

    #[tokio::test]
    async fn concurrent_claims_partition_the_queue() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let queue = Arc::new(InMemoryJobQueue::new());
        for i in 0..20 {
            queue.enqueue(new_job(&format!("wh-{i}"))).await.unwrap();
        }

        let mut handles = Vec::new();
        for w in 0..2 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                queue
                    .claim(&WorkerId::from(format!("w{w}")), 20, STALE)
                    .await
                    .unwrap()
            }));
        }

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for job in handle.await.unwrap() {
                assert!(seen.insert(job.id), "job claimed twice");
                total += 1;
            }
        }
        assert_eq!(total, 20);
    }
}

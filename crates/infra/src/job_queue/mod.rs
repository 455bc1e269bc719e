//! Durable job queue boundary.
//!
//! Exactly one job is created per accepted delivery. After creation the
//! ingestion handler never touches a job again; only the drain worker
//! transitions status and attempt count. The claim operation is the sole
//! serialization point between concurrent drain invocations and must be an
//! atomic conditional update, never a read followed by a separate write.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryJobQueue;
pub use postgres::PostgresJobQueue;

use std::time::Duration;

use chrono::{DateTime, Utc};
use orderflow_core::{DeliveryId, JobId, JobStatus, OrderId, ShopDomain, WebhookTopic, WorkerId};
use thiserror::Error;

/// Work item submitted by the ingestion handler.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub delivery_id: DeliveryId,
    pub topic: WebhookTopic,
    pub shop_domain: ShopDomain,
    pub order_id: Option<OrderId>,
    pub payload: serde_json::Value,
}

/// A queued work item and its execution state.
#[derive(Debug, Clone)]
pub struct WebhookJob {
    pub id: JobId,
    pub delivery_id: DeliveryId,
    pub topic: WebhookTopic,
    pub shop_domain: ShopDomain,
    pub order_id: Option<OrderId>,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<WorkerId>,
    pub last_error: Option<String>,
}

/// Queue counts by status, for the operator stats surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobCounts {
    pub pending: u64,
    pub processing: u64,
    pub done: u64,
    pub failed: u64,
}

/// Job queue error.
#[derive(Debug, Error, Clone)]
pub enum QueueError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job not in processing state: {0}")]
    NotProcessing(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Durable store of pending work items.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a new pending job.
    async fn enqueue(&self, job: NewJob) -> Result<JobId, QueueError>;

    /// Atomically claim up to `max` claimable jobs for `worker`, oldest
    /// enqueued first, marking them `processing` and stamping the claim.
    ///
    /// Claimable means `pending`, or `processing` with a last attempt older
    /// than `stale_after` (a worker died mid-batch). Two concurrent claims
    /// never return the same job.
    async fn claim(
        &self,
        worker: &WorkerId,
        max: usize,
        stale_after: Duration,
    ) -> Result<Vec<WebhookJob>, QueueError>;

    /// Transition a claimed job to `done`. Only valid from `processing`; a
    /// job in any other state is [`QueueError::NotProcessing`], so a stray
    /// call can never rewrite a terminal state.
    async fn complete(&self, id: JobId) -> Result<(), QueueError>;

    /// Transition a claimed job to `failed`, recording the error detail.
    /// Only valid from `processing`, as with [`JobQueue::complete`].
    async fn fail(&self, id: JobId, error: &str) -> Result<(), QueueError>;

    /// Queue counts by status.
    async fn counts(&self) -> Result<JobCounts, QueueError>;
}

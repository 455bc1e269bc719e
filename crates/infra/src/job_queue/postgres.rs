//! Postgres-backed job queue.
//!
//! The claim is a single conditional UPDATE over a locked FIFO selection
//! (`FOR UPDATE SKIP LOCKED`), so overlapping drain invocations partition
//! the queue instead of double-claiming.

use std::time::Duration;

use chrono::{DateTime, Utc};
use orderflow_core::{DeliveryId, JobId, JobStatus, OrderId, ShopDomain, WebhookTopic, WorkerId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use super::{JobCounts, JobQueue, NewJob, QueueError, WebhookJob};

#[derive(Debug, Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A status-guarded update matched no row: tell a missing job apart from
    /// one outside `processing`.
    async fn settle_error(&self, id: JobId) -> QueueError {
        let row = sqlx::query("SELECT 1 FROM webhook_jobs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await;
        match row {
            Ok(Some(_)) => QueueError::NotProcessing(id),
            Ok(None) => QueueError::NotFound(id),
            Err(e) => QueueError::Storage(format!("inspect job: {e}")),
        }
    }
}

#[async_trait::async_trait]
impl JobQueue for PostgresJobQueue {
    #[instrument(skip(self, job), fields(delivery_id = %job.delivery_id, topic = %job.topic))]
    async fn enqueue(&self, job: NewJob) -> Result<JobId, QueueError> {
        let id = JobId::new();
        sqlx::query(
            r#"
            INSERT INTO webhook_jobs
                (id, delivery_id, topic, shop_domain, order_id, payload, status, attempt, enqueued_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', 0, now())
            "#,
        )
        .bind(id.as_uuid())
        .bind(job.delivery_id.as_str())
        .bind(job.topic.as_str())
        .bind(job.shop_domain.as_str())
        .bind(job.order_id.map(|o| o.as_i64()))
        .bind(&job.payload)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(format!("enqueue job: {e}")))?;

        Ok(id)
    }

    #[instrument(skip(self), fields(worker = %worker, max))]
    async fn claim(
        &self,
        worker: &WorkerId,
        max: usize,
        stale_after: Duration,
    ) -> Result<Vec<WebhookJob>, QueueError> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            UPDATE webhook_jobs
            SET status = 'processing',
                claimed_by = $1,
                attempt = attempt + 1,
                last_attempted_at = now()
            WHERE id IN (
                SELECT id FROM webhook_jobs
                WHERE status = 'pending'
                   OR (status = 'processing'
                       AND last_attempted_at <= now() - make_interval(secs => $3))
                ORDER BY enqueued_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, delivery_id, topic, shop_domain, order_id, payload,
                      status, attempt, enqueued_at, last_attempted_at, claimed_by, last_error
            "#,
        )
        .bind(worker.as_str())
        .bind(max as i64)
        .bind(stale_after.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(format!("claim jobs: {e}")))?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            claimed.push(job_from_row(&row)?);
        }
        // RETURNING does not promise the selection's ordering.
        claimed.sort_by_key(|j| j.enqueued_at);
        Ok(claimed)
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn complete(&self, id: JobId) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE webhook_jobs SET status = 'done' WHERE id = $1 AND status = 'processing'",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(format!("complete job: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(self.settle_error(id).await);
        }
        Ok(())
    }

    #[instrument(skip(self, error), fields(job_id = %id))]
    async fn fail(&self, id: JobId, error: &str) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE webhook_jobs SET status = 'failed', last_error = $2 \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(format!("fail job: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(self.settle_error(id).await);
        }
        Ok(())
    }

    async fn counts(&self) -> Result<JobCounts, QueueError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM webhook_jobs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(format!("count jobs: {e}")))?;

        let mut counts = JobCounts::default();
        for row in rows {
            let status: String = row
                .try_get("status")
                .map_err(|e| QueueError::Storage(format!("read status: {e}")))?;
            let count: i64 = row
                .try_get("count")
                .map_err(|e| QueueError::Storage(format!("read count: {e}")))?;
            match JobStatus::parse(&status) {
                Some(JobStatus::Pending) => counts.pending = count as u64,
                Some(JobStatus::Processing) => counts.processing = count as u64,
                Some(JobStatus::Done) => counts.done = count as u64,
                Some(JobStatus::Failed) => counts.failed = count as u64,
                None => {
                    return Err(QueueError::Storage(format!("unknown job status: {status}")));
                }
            }
        }
        Ok(counts)
    }
}

fn job_from_row(row: &PgRow) -> Result<WebhookJob, QueueError> {
    let read = |e: sqlx::Error| QueueError::Storage(format!("read job row: {e}"));

    let id: Uuid = row.try_get("id").map_err(read)?;
    let delivery_id: String = row.try_get("delivery_id").map_err(read)?;
    let topic: String = row.try_get("topic").map_err(read)?;
    let shop_domain: String = row.try_get("shop_domain").map_err(read)?;
    let order_id: Option<i64> = row.try_get("order_id").map_err(read)?;
    let payload: serde_json::Value = row.try_get("payload").map_err(read)?;
    let status: String = row.try_get("status").map_err(read)?;
    let attempt: i32 = row.try_get("attempt").map_err(read)?;
    let enqueued_at: DateTime<Utc> = row.try_get("enqueued_at").map_err(read)?;
    let last_attempted_at: Option<DateTime<Utc>> = row.try_get("last_attempted_at").map_err(read)?;
    let claimed_by: Option<String> = row.try_get("claimed_by").map_err(read)?;
    let last_error: Option<String> = row.try_get("last_error").map_err(read)?;

    let topic = WebhookTopic::parse(&topic)
        .ok_or_else(|| QueueError::Storage(format!("unknown topic in job row: {topic}")))?;
    let status = JobStatus::parse(&status)
        .ok_or_else(|| QueueError::Storage(format!("unknown status in job row: {status}")))?;

    Ok(WebhookJob {
        id: JobId::from_uuid(id),
        delivery_id: DeliveryId::from(delivery_id),
        topic,
        shop_domain: ShopDomain::from(shop_domain),
        order_id: order_id.map(OrderId::new),
        payload,
        status,
        attempt: attempt.max(0) as u32,
        enqueued_at,
        last_attempted_at,
        claimed_by: claimed_by.map(WorkerId::from),
        last_error,
    })
}

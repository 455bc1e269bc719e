//! Postgres-backed event log.

use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::{EventLog, EventLogError, NewEvent};

#[derive(Debug, Clone)]
pub struct PostgresEventLog {
    pool: PgPool,
}

impl PostgresEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EventLog for PostgresEventLog {
    #[instrument(skip(self, event), fields(disposition = %event.disposition))]
    async fn append(&self, event: NewEvent) -> Result<(), EventLogError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_events
                (id, delivery_id, topic, shop_domain, order_id, payload, disposition, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(event.delivery_id.as_ref().map(|id| id.as_str().to_string()))
        .bind(&event.topic)
        .bind(event.shop_domain.as_ref().map(|s| s.as_str().to_string()))
        .bind(event.order_id.map(|id| id.as_i64()))
        .bind(&event.payload)
        .bind(event.disposition.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| EventLogError::Storage(format!("append event: {e}")))?;

        Ok(())
    }
}

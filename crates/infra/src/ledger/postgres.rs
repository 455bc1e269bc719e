//! Postgres-backed dedup ledger.
//!
//! The `webhook_deliveries` primary key on `delivery_id` is the contract:
//! the INSERT either wins or fails with a unique violation, which maps to
//! [`LedgerError::Duplicate`]. Every other error is a transient storage
//! failure the caller surfaces as retryable.

use sqlx::PgPool;
use tracing::instrument;

use super::{DedupLedger, LedgerError, WebhookDelivery};

#[derive(Debug, Clone)]
pub struct PostgresDedupLedger {
    pool: PgPool,
}

impl PostgresDedupLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DedupLedger for PostgresDedupLedger {
    #[instrument(skip(self, delivery), fields(delivery_id = %delivery.delivery_id))]
    async fn insert(&self, delivery: WebhookDelivery) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_deliveries (delivery_id, topic, shop_domain, received_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(delivery.delivery_id.as_str())
        .bind(delivery.topic.as_str())
        .bind(delivery.shop_domain.as_str())
        .bind(delivery.received_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(LedgerError::Duplicate(delivery.delivery_id))
            }
            Err(err) => Err(LedgerError::Storage(format!("insert delivery: {err}"))),
        }
    }
}

/// Check if an error is a unique constraint violation (Postgres `23505`).
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

//! Dedup ledger boundary.
//!
//! The single source of truth for "have we already accepted this delivery".
//! Insertion is the atomic dedup gate: the mandated pattern is one INSERT
//! with the uniqueness conflict as the duplicate signal, never
//! select-then-insert, which races.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryDedupLedger;
pub use postgres::PostgresDedupLedger;

use chrono::{DateTime, Utc};
use orderflow_core::{DeliveryId, ShopDomain, WebhookTopic};
use thiserror::Error;

/// One accepted delivery. Written once on first acceptance, never updated,
/// never deleted (retained for replay protection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookDelivery {
    pub delivery_id: DeliveryId,
    pub topic: WebhookTopic,
    pub shop_domain: ShopDomain,
    pub received_at: DateTime<Utc>,
}

impl WebhookDelivery {
    pub fn new(delivery_id: DeliveryId, topic: WebhookTopic, shop_domain: ShopDomain) -> Self {
        Self {
            delivery_id,
            topic,
            shop_domain,
            received_at: Utc::now(),
        }
    }
}

/// Dedup ledger error.
///
/// `Duplicate` is a normal control-flow signal for the ingestion handler,
/// distinct from transient storage failures which must surface as a retryable
/// server error.
#[derive(Debug, Error, Clone)]
pub enum LedgerError {
    #[error("delivery already accepted: {0}")]
    Duplicate(DeliveryId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Uniqueness-constrained store gating acceptance of a delivery.
#[async_trait::async_trait]
pub trait DedupLedger: Send + Sync {
    /// Insert the delivery; first writer wins. A concurrent or repeated
    /// insert with the same delivery id fails with [`LedgerError::Duplicate`].
    async fn insert(&self, delivery: WebhookDelivery) -> Result<(), LedgerError>;
}

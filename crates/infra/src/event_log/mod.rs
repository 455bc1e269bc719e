//! Append-only audit trail of delivery attempts.
//!
//! One entry per inbound attempt regardless of outcome, including attempts
//! rejected before a delivery identifier is known. Used for forensic replay;
//! never read by the processing path.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryEventLog;
pub use postgres::PostgresEventLog;

use orderflow_core::{DeliveryId, Disposition, OrderId, ShopDomain};
use thiserror::Error;

/// One delivery attempt and its disposition.
///
/// `topic` is the raw header value, not the parsed enum: unsupported topics
/// are logged too. `payload` holds the parsed body when parsing succeeded,
/// or the raw body as a string for forensic review of rejected attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub delivery_id: Option<DeliveryId>,
    pub topic: String,
    pub shop_domain: Option<ShopDomain>,
    pub order_id: Option<OrderId>,
    pub payload: serde_json::Value,
    pub disposition: Disposition,
}

/// Event log error.
#[derive(Debug, Error, Clone)]
pub enum EventLogError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Append-only log; entries are never updated or deleted.
#[async_trait::async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, event: NewEvent) -> Result<(), EventLogError>;
}

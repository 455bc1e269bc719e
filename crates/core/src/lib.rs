//! `orderflow-core` — domain foundation for the webhook pipeline.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the closed topic set accepted from the commerce
//! platform, delivery dispositions, and the payload normalizer.

pub mod error;
pub mod id;
pub mod normalize;
pub mod topic;
pub mod types;

pub use error::{DomainError, DomainResult};
pub use id::{DeliveryId, JobId, OrderId, ShopDomain, WorkerId};
pub use normalize::normalize;
pub use topic::WebhookTopic;
pub use types::{Disposition, JobStatus, WorkDescriptor};

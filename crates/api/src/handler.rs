//! Job execution at the application edge.

use anyhow::bail;
use orderflow_infra::{JobHandler, WebhookJob};
use tracing::info;

/// Applies a queued delivery to the order views.
///
/// The write side of the admin app is not part of this service; this handler
/// records the application intent and enforces the one precondition every
/// downstream write shares, a resolvable order reference.
#[derive(Debug, Default)]
pub struct OrderSyncHandler;

impl OrderSyncHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl JobHandler for OrderSyncHandler {
    async fn execute(&self, job: &WebhookJob) -> anyhow::Result<()> {
        let Some(order_id) = job.order_id else {
            bail!("payload carries no order reference");
        };
        info!(
            delivery_id = %job.delivery_id,
            topic = %job.topic,
            order_id = %order_id,
            shop_domain = %job.shop_domain,
            attempt = job.attempt,
            "applying order update"
        );
        Ok(())
    }
}

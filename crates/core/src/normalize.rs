//! Payload normalization: raw topic-specific payloads into a canonical
//! [`WorkDescriptor`].
//!
//! The upstream platform ships a different payload shape per topic; this is
//! inherent to the protocol, so it is modeled as one extraction rule per
//! topic variant rather than open-ended field lookup.

use serde_json::Value;

use crate::id::OrderId;
use crate::topic::WebhookTopic;
use crate::types::WorkDescriptor;

/// Extract the business-entity reference from a topic-specific payload.
///
/// Total: an unrecognized shape within a supported topic yields
/// `order_id = None` rather than an error, so a partial webhook is still
/// logged and queued for manual inspection instead of being dropped.
pub fn normalize(topic: WebhookTopic, payload: &Value) -> WorkDescriptor {
    let order_id = match topic {
        // Order payloads carry their own identifier at the top level.
        WebhookTopic::OrderCreated | WebhookTopic::OrderCancelled => {
            extract_order_ref(payload.get("id"))
        }
        // Refund payloads reference the order they apply to.
        WebhookTopic::RefundCreated => extract_order_ref(payload.get("order_id")),
    };

    WorkDescriptor { order_id }
}

/// The platform serializes identifiers as JSON numbers, but older API
/// versions used decimal strings; accept both.
fn extract_order_ref(value: Option<&Value>) -> Option<OrderId> {
    match value {
        Some(Value::Number(n)) => n.as_i64().map(OrderId::new),
        Some(Value::String(s)) => s.parse::<i64>().ok().map(OrderId::new),
        _ => None,
    }
}

//! The closed set of webhook topics we subscribe to.

use serde::{Deserialize, Serialize};

/// Event topics accepted from the commerce platform.
///
/// This is a closed allow-list: any other topic on the wire is acknowledged
/// but never queued. Adding a variant here means adding an extraction rule in
/// [`crate::normalize`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookTopic {
    #[serde(rename = "order-created")]
    OrderCreated,
    #[serde(rename = "order-cancelled")]
    OrderCancelled,
    #[serde(rename = "refund-created")]
    RefundCreated,
}

impl WebhookTopic {
    /// All supported topics, in subscription order.
    pub const ALL: [WebhookTopic; 3] = [
        WebhookTopic::OrderCreated,
        WebhookTopic::OrderCancelled,
        WebhookTopic::RefundCreated,
    ];

    /// Parse a topic header value. `None` means the topic is outside the
    /// allow-list (not an error: the caller acknowledges and skips it).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "order-created" => Some(Self::OrderCreated),
            "order-cancelled" => Some(Self::OrderCancelled),
            "refund-created" => Some(Self::RefundCreated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "order-created",
            Self::OrderCancelled => "order-cancelled",
            Self::RefundCreated => "refund-created",
        }
    }
}

impl core::fmt::Display for WebhookTopic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

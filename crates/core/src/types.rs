//! Dispositions, job lifecycle states, and the canonical work descriptor.

use serde::{Deserialize, Serialize};

use crate::id::OrderId;

/// Terminal outcome recorded for every delivery attempt in the audit log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Accepted: deduped, normalized, and queued.
    Received,
    /// Rejected with a client error (bad signature, missing id, bad body).
    Rejected,
    /// Topic outside the allow-list; acknowledged, never queued.
    SkippedUnsupportedTopic,
    /// Delivery id already in the dedup ledger; acknowledged, never queued.
    SkippedDuplicate,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Rejected => "rejected",
            Self::SkippedUnsupportedTopic => "skipped_unsupported_topic",
            Self::SkippedDuplicate => "skipped_duplicate",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "received" => Some(Self::Received),
            "rejected" => Some(Self::Rejected),
            "skipped_unsupported_topic" => Some(Self::SkippedUnsupportedTopic),
            "skipped_duplicate" => Some(Self::SkippedDuplicate),
            _ => None,
        }
    }
}

impl core::fmt::Display for Disposition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue entry lifecycle.
///
/// `pending -> processing -> done | failed`. Jobs stuck in `processing`
/// past the staleness threshold are claimable again (worker died mid-batch).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical internal work descriptor produced by the normalizer.
///
/// `order_id` is `None` when the payload shape is unrecognized within an
/// otherwise-supported topic; such deliveries are still logged and queued so
/// an operator can inspect them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDescriptor {
    pub order_id: Option<OrderId>,
}

//! The ingestion state machine.
//!
//! Converts the at-least-once, adversarial inbound channel into an
//! exactly-once stream of work items. Checks run in a fixed order, each a
//! possible terminal disposition; see [`IngestPipeline::handle`].
//!
//! Response semantics toward the upstream sender are deliberate: success
//! outcomes suppress redelivery (accepted, duplicate, unsupported topic),
//! client errors also suppress it (retrying a defective request cannot
//! help), and only transient storage failures surface as a retryable server
//! error.

use std::sync::Arc;
use std::time::Duration;

use orderflow_core::{DeliveryId, OrderId, ShopDomain, WebhookTopic, normalize};
use orderflow_webhooks::AdmissionControl;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::event_log::{EventLog, EventLogError, NewEvent};
use crate::job_queue::{JobQueue, NewJob, QueueError};
use crate::ledger::{DedupLedger, LedgerError, WebhookDelivery};

/// One inbound delivery as seen by the HTTP edge: raw body bytes plus the
/// relevant header values. The body must be the exact wire bytes — the
/// signature binds to them.
#[derive(Debug, Clone, Copy)]
pub struct IngestRequest<'a> {
    /// Rate-limit key for the caller's network address; the sentinel key
    /// when the address is unknown.
    pub addr_key: &'a str,
    pub delivery_id: Option<&'a str>,
    pub topic: Option<&'a str>,
    pub shop_domain: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub body: &'a [u8],
}

/// Terminal disposition of one delivery attempt, free of HTTP framework
/// types; the API layer maps these onto status codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Accepted: deduped, logged, and exactly one job enqueued.
    Accepted {
        delivery_id: DeliveryId,
        order_id: Option<OrderId>,
    },
    /// Delivery id already in the ledger; a no-op toward the sender.
    SkippedDuplicate,
    /// Topic outside the allow-list; acknowledged so the sender does not
    /// retry a topic we deliberately ignore.
    SkippedUnsupportedTopic,
    /// Signature missing or invalid. Identical for a bad secret and a bad
    /// body: the response must not reveal which.
    Unauthorized,
    /// Missing delivery id or malformed body.
    BadRequest(&'static str),
    /// Admission control rejected the caller.
    RateLimited { retry_after: Duration },
    /// Shared secret not configured; operator-actionable, not an attack.
    Misconfigured,
}

/// Transient storage failure; surfaces as a retryable server error since
/// nothing was durably accepted.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("dedup ledger: {0}")]
    Ledger(LedgerError),
    #[error("event log: {0}")]
    EventLog(#[from] EventLogError),
    #[error("job queue: {0}")]
    Queue(#[from] QueueError),
}

/// The synchronous entry point invoked per inbound delivery.
pub struct IngestPipeline {
    secret: Option<String>,
    admission: Arc<AdmissionControl>,
    ledger: Arc<dyn DedupLedger>,
    event_log: Arc<dyn EventLog>,
    queue: Arc<dyn JobQueue>,
}

impl IngestPipeline {
    pub fn new(
        secret: Option<String>,
        admission: Arc<AdmissionControl>,
        ledger: Arc<dyn DedupLedger>,
        event_log: Arc<dyn EventLog>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            secret,
            admission,
            ledger,
            event_log,
            queue,
        }
    }

    /// Run one delivery through the state machine.
    ///
    /// Every step's effect is immediately durable, so a caller timeout
    /// leaves state at the last completed step and a redelivery resumes
    /// correctly (the dedup gate absorbs the replay).
    pub async fn handle(&self, req: IngestRequest<'_>) -> Result<IngestOutcome, PipelineError> {
        // 1. Fail closed on missing configuration.
        let Some(secret) = self.secret.as_deref() else {
            error!("webhook secret not configured; rejecting delivery");
            return Ok(IngestOutcome::Misconfigured);
        };

        // 2. Admission control. Runs before any store access so a flood
        // cannot amplify into the log store.
        let decision = self.admission.admit(req.addr_key, req.shop_domain);
        if !decision.allowed {
            debug!(addr_key = req.addr_key, "delivery rate-limited");
            return Ok(IngestOutcome::RateLimited {
                retry_after: decision.reset,
            });
        }

        let raw_topic = req.topic.unwrap_or_default();
        let shop_domain = req.shop_domain.map(ShopDomain::from);

        // 3. Topic allow-list. Acknowledged but never queued.
        let Some(topic) = WebhookTopic::parse(raw_topic) else {
            self.log_attempt(NewEvent {
                delivery_id: req.delivery_id.map(DeliveryId::from),
                topic: raw_topic.to_string(),
                shop_domain,
                order_id: None,
                payload: raw_body_for_forensics(req.body),
                disposition: orderflow_core::Disposition::SkippedUnsupportedTopic,
            })
            .await;
            debug!(topic = raw_topic, "unsupported topic acknowledged");
            return Ok(IngestOutcome::SkippedUnsupportedTopic);
        };

        // 4. Signature over the exact raw bytes.
        if !orderflow_webhooks::verify(req.body, req.signature, secret) {
            self.log_attempt(NewEvent {
                delivery_id: req.delivery_id.map(DeliveryId::from),
                topic: raw_topic.to_string(),
                shop_domain: shop_domain.clone(),
                order_id: None,
                // Raw body preserved for forensic review.
                payload: raw_body_for_forensics(req.body),
                disposition: orderflow_core::Disposition::Rejected,
            })
            .await;
            warn!(addr_key = req.addr_key, "signature verification failed");
            return Ok(IngestOutcome::Unauthorized);
        }

        // 5. Delivery identifier presence.
        let Some(delivery_id) = req.delivery_id else {
            self.log_attempt(NewEvent {
                delivery_id: None,
                topic: raw_topic.to_string(),
                shop_domain: shop_domain.clone(),
                order_id: None,
                payload: raw_body_for_forensics(req.body),
                disposition: orderflow_core::Disposition::Rejected,
            })
            .await;
            return Ok(IngestOutcome::BadRequest("missing delivery identifier"));
        };
        let delivery_id = DeliveryId::from(delivery_id);

        // 6. Parse. Only after the signature has bound the raw bytes.
        let payload: serde_json::Value = match serde_json::from_slice(req.body) {
            Ok(value) => value,
            Err(err) => {
                self.log_attempt(NewEvent {
                    delivery_id: Some(delivery_id),
                    topic: raw_topic.to_string(),
                    shop_domain: shop_domain.clone(),
                    order_id: None,
                    payload: raw_body_for_forensics(req.body),
                    disposition: orderflow_core::Disposition::Rejected,
                })
                .await;
                debug!(error = %err, "malformed delivery body");
                return Ok(IngestOutcome::BadRequest("malformed body"));
            }
        };

        let shop = shop_domain.clone().unwrap_or_else(|| ShopDomain::from("unknown"));

        // 7. Dedup gate: atomic first-writer-wins insert. A conflict is the
        // duplicate signal; anything else is a transient failure that must
        // propagate so the sender retries.
        match self
            .ledger
            .insert(WebhookDelivery::new(delivery_id.clone(), topic, shop.clone()))
            .await
        {
            Ok(()) => {}
            Err(LedgerError::Duplicate(_)) => {
                self.log_attempt(NewEvent {
                    delivery_id: Some(delivery_id.clone()),
                    topic: raw_topic.to_string(),
                    shop_domain,
                    order_id: None,
                    payload,
                    disposition: orderflow_core::Disposition::SkippedDuplicate,
                })
                .await;
                debug!(delivery_id = %delivery_id, "duplicate delivery skipped");
                return Ok(IngestOutcome::SkippedDuplicate);
            }
            Err(err) => return Err(PipelineError::Ledger(err)),
        }

        // 8. Accept: normalize, log, enqueue exactly one job.
        let descriptor = normalize(topic, &payload);

        self.event_log
            .append(NewEvent {
                delivery_id: Some(delivery_id.clone()),
                topic: raw_topic.to_string(),
                shop_domain,
                order_id: descriptor.order_id,
                payload: payload.clone(),
                disposition: orderflow_core::Disposition::Received,
            })
            .await?;

        self.queue
            .enqueue(NewJob {
                delivery_id: delivery_id.clone(),
                topic,
                shop_domain: shop,
                order_id: descriptor.order_id,
                payload,
            })
            .await?;

        info!(
            delivery_id = %delivery_id,
            topic = %topic,
            order_id = ?descriptor.order_id,
            "delivery accepted and queued"
        );
        Ok(IngestOutcome::Accepted {
            delivery_id,
            order_id: descriptor.order_id,
        })
    }

    /// Best-effort audit write on rejection paths: the rejection stands even
    /// if the log write fails, since nothing downstream depends on it.
    async fn log_attempt(&self, event: NewEvent) {
        if let Err(err) = self.event_log.append(event).await {
            warn!(error = %err, "failed to record delivery attempt");
        }
    }
}

/// Rejected bodies go into the log verbatim (lossy UTF-8) rather than
/// parsed: parsing may be the very thing that failed.
fn raw_body_for_forensics(body: &[u8]) -> serde_json::Value {
    serde_json::Value::String(String::from_utf8_lossy(body).into_owned())
}

//! In-memory dedup ledger for tests/dev.

use std::collections::HashMap;
use std::sync::Mutex;

use orderflow_core::DeliveryId;

use super::{DedupLedger, LedgerError, WebhookDelivery};

/// Mutex-guarded map keyed by delivery id. The insert check and write happen
/// under one lock acquisition, matching the atomicity the Postgres unique
/// constraint provides.
#[derive(Debug, Default)]
pub struct InMemoryDedupLedger {
    deliveries: Mutex<HashMap<DeliveryId, WebhookDelivery>>,
}

impl InMemoryDedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accepted deliveries. Test hook.
    pub fn len(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl DedupLedger for InMemoryDedupLedger {
    async fn insert(&self, delivery: WebhookDelivery) -> Result<(), LedgerError> {
        let mut deliveries = self.deliveries.lock().unwrap();
        if deliveries.contains_key(&delivery.delivery_id) {
            return Err(LedgerError::Duplicate(delivery.delivery_id));
        }
        deliveries.insert(delivery.delivery_id.clone(), delivery);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderflow_core::{ShopDomain, WebhookTopic};

    fn delivery(id: &str) -> WebhookDelivery {
        WebhookDelivery::new(
            DeliveryId::from(id),
            WebhookTopic::OrderCreated,
            ShopDomain::from("shop.example.com"),
        )
    }

    #[tokio::test]
    async fn first_insert_wins_second_is_duplicate() {
        let ledger = InMemoryDedupLedger::new();
        ledger.insert(delivery("wh-1")).await.unwrap();

        let err = ledger.insert(delivery("wh-1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Duplicate(id) if id.as_str() == "wh-1"));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn distinct_ids_both_insert() {
        let ledger = InMemoryDedupLedger::new();
        ledger.insert(delivery("wh-1")).await.unwrap();
        ledger.insert(delivery("wh-2")).await.unwrap();
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_inserts_admit_exactly_one() {
        use std::sync::Arc;

        let ledger = Arc::new(InMemoryDedupLedger::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(
                async move { ledger.insert(delivery("wh-race")).await },
            ));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(ledger.len(), 1);
    }
}

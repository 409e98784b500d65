//! In-memory payment store.
//!
//! Backs tests and single-node development. Lookups by reference scan the
//! map, which is fine at that scale and keeps both secondary lookups
//! consistent with updates for free.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::PaymentId;
use crate::domain::payment::{Payment, PaymentReference};
use crate::ports::{PaymentStore, StoreError};

/// In-memory [`PaymentStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payments.
    pub async fn count(&self) -> usize {
        self.payments.read().await.len()
    }

    /// Drop all stored payments.
    pub async fn clear(&self) {
        self.payments.write().await.clear();
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn save(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.id) {
            return Err(StoreError::conflict(format!(
                "payment '{}' already saved",
                payment.id
            )));
        }
        if payments.values().any(|p| p.reference == payment.reference) {
            return Err(StoreError::conflict(format!(
                "reference '{}' already taken",
                payment.reference
            )));
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut payments = self.payments.write().await;
        if !payments.contains_key(&payment.id) {
            return Err(StoreError::not_found("payment", payment.id));
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, StoreError> {
        Ok(self.payments.read().await.get(id).cloned())
    }

    async fn find_by_reference(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<Payment>, StoreError> {
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .find(|p| p.reference == *reference)
            .cloned())
    }

    async fn find_by_gateway_reference(
        &self,
        gateway_reference: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .find(|p| p.gateway_reference.as_deref() == Some(gateway_reference))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{CurrencyCode, Money, OrderId, TenantId};
    use crate::domain::payment::GatewayId;
    use rust_decimal_macros::dec;

    fn test_payment() -> Payment {
        Payment::create(
            TenantId::new(),
            OrderId::new(),
            GatewayId::Paystack,
            Money::new(dec!(2500), CurrencyCode::NGN).unwrap(),
        )
    }

    #[tokio::test]
    async fn save_and_find_by_every_key() {
        let store = InMemoryPaymentStore::new();
        let mut payment = test_payment();
        payment.mark_processing(Some("ref_abc123".to_string())).unwrap();

        store.save(&payment).await.unwrap();

        let by_id = store.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(by_id.reference, payment.reference);

        let by_ref = store
            .find_by_reference(&payment.reference)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_ref.id, payment.id);

        let by_gateway_ref = store
            .find_by_gateway_reference("ref_abc123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_gateway_ref.id, payment.id);
    }

    #[tokio::test]
    async fn save_rejects_duplicate_reference() {
        let store = InMemoryPaymentStore::new();
        let payment = test_payment();
        store.save(&payment).await.unwrap();

        let mut twin = test_payment();
        twin.reference = payment.reference.clone();
        let err = store.save(&twin).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn update_requires_existing_payment() {
        let store = InMemoryPaymentStore::new();
        let payment = test_payment();

        let err = store.update(&payment).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn update_replaces_stored_state() {
        let store = InMemoryPaymentStore::new();
        let mut payment = test_payment();
        store.save(&payment).await.unwrap();

        payment.complete(None).unwrap();
        store.update(&payment).await.unwrap();

        let loaded = store.find_by_id(&payment.id).await.unwrap().unwrap();
        assert!(loaded.is_completed());
    }

    #[tokio::test]
    async fn missing_lookups_return_none() {
        let store = InMemoryPaymentStore::new();
        assert!(store.find_by_id(&PaymentId::new()).await.unwrap().is_none());
        assert!(store
            .find_by_gateway_reference("ws_CO_nope")
            .await
            .unwrap()
            .is_none());
    }
}

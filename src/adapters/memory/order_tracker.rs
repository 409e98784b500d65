//! In-memory order tracker.
//!
//! Records settlement marks keyed by order, so webhook retries that mark
//! the same order paid twice collapse into one entry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{OrderId, PaymentId};
use crate::ports::{OrderTracker, StoreError};

/// In-memory [`OrderTracker`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderTracker {
    paid: Arc<RwLock<HashMap<OrderId, PaymentId>>>,
    refunded: Arc<RwLock<HashMap<OrderId, PaymentId>>>,
}

impl InMemoryOrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payment that settled the order, if any.
    pub async fn paid_with(&self, order_id: &OrderId) -> Option<PaymentId> {
        self.paid.read().await.get(order_id).copied()
    }

    pub async fn is_paid(&self, order_id: &OrderId) -> bool {
        self.paid.read().await.contains_key(order_id)
    }

    pub async fn is_refunded(&self, order_id: &OrderId) -> bool {
        self.refunded.read().await.contains_key(order_id)
    }

    /// Number of orders marked paid.
    pub async fn paid_count(&self) -> usize {
        self.paid.read().await.len()
    }
}

#[async_trait]
impl OrderTracker for InMemoryOrderTracker {
    async fn mark_paid(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
    ) -> Result<(), StoreError> {
        self.paid.write().await.insert(*order_id, *payment_id);
        Ok(())
    }

    async fn mark_refunded(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
    ) -> Result<(), StoreError> {
        self.refunded.write().await.insert(*order_id, *payment_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeated_marks_collapse_to_one_entry() {
        let tracker = InMemoryOrderTracker::new();
        let order = OrderId::new();
        let payment = PaymentId::new();

        tracker.mark_paid(&order, &payment).await.unwrap();
        tracker.mark_paid(&order, &payment).await.unwrap();

        assert_eq!(tracker.paid_count().await, 1);
        assert_eq!(tracker.paid_with(&order).await, Some(payment));
    }

    #[tokio::test]
    async fn refunds_are_tracked_separately() {
        let tracker = InMemoryOrderTracker::new();
        let order = OrderId::new();
        let payment = PaymentId::new();

        tracker.mark_paid(&order, &payment).await.unwrap();
        assert!(!tracker.is_refunded(&order).await);

        tracker.mark_refunded(&order, &payment).await.unwrap();
        assert!(tracker.is_refunded(&order).await);
        assert!(tracker.is_paid(&order).await);
    }
}

//! Order tracker port.
//!
//! The storefront owns carts and orders; the payment layer only needs to
//! tell it when money moved. This port is that seam.

use async_trait::async_trait;

use crate::domain::foundation::{OrderId, PaymentId};

use super::StoreError;

/// Port for reporting settlement back to the storefront's order system.
#[async_trait]
pub trait OrderTracker: Send + Sync {
    /// Mark an order as paid by the given payment.
    ///
    /// Implementations must tolerate repeated calls for the same order,
    /// webhook retries make duplicates routine.
    async fn mark_paid(&self, order_id: &OrderId, payment_id: &PaymentId)
        -> Result<(), StoreError>;

    /// Mark an order as refunded.
    async fn mark_refunded(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
    ) -> Result<(), StoreError>;
}

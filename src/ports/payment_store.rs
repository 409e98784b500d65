//! Payment store port.
//!
//! Persistence contract for Payment aggregates. Webhook handling looks
//! payments up by either reference, so both lookups are first-class.

use async_trait::async_trait;

use crate::domain::foundation::PaymentId;
use crate::domain::payment::{Payment, PaymentReference};

use super::StoreError;

/// Repository port for Payment aggregate persistence.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Save a new payment.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the reference is already taken
    async fn save(&self, payment: &Payment) -> Result<(), StoreError>;

    /// Update an existing payment.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the payment does not exist
    async fn update(&self, payment: &Payment) -> Result<(), StoreError>;

    /// Find a payment by its ID.
    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, StoreError>;

    /// Find a payment by its platform reference.
    async fn find_by_reference(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<Payment>, StoreError>;

    /// Find a payment by the reference the gateway assigned.
    ///
    /// Used by webhook handling when the payload carries only the
    /// provider-side id.
    async fn find_by_gateway_reference(
        &self,
        gateway_reference: &str,
    ) -> Result<Option<Payment>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait object safety test
    #[test]
    fn payment_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn PaymentStore) {}
    }
}

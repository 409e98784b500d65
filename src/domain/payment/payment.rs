//! Payment aggregate entity.
//!
//! A Payment records one collection attempt against a gateway. The row is
//! created locally, in `Pending`, before the first network call, so failed
//! or abandoned attempts still leave an audit trail.
//!
//! # Invariants
//!
//! - `reference` is generated by the platform and never changes
//! - Status transitions follow the `PaymentStatus` state machine
//! - `paid_at` is stamped exactly once, on the first completion

use crate::domain::foundation::{
    Money, OrderId, PaymentId, TenantId, Timestamp, TransitionError,
};
use serde::{Deserialize, Serialize};

use super::{GatewayId, PaymentReference, PaymentStatus};

/// Payment aggregate - one collection attempt for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier for this payment.
    pub id: PaymentId,

    /// Store this payment belongs to.
    pub tenant_id: TenantId,

    /// Order being paid for.
    pub order_id: OrderId,

    /// Platform-generated reference, created before any gateway call.
    pub reference: PaymentReference,

    /// Gateway handling this payment.
    pub gateway: GatewayId,

    /// Reference assigned by the gateway, once known.
    pub gateway_reference: Option<String>,

    /// Amount being collected.
    pub amount: Money,

    /// Current status in the collection lifecycle.
    pub status: PaymentStatus,

    /// Customer email, when the gateway requires or returns one.
    pub customer_email: Option<String>,

    /// Customer phone in the gateway's normalized form.
    pub customer_phone: Option<String>,

    /// Last raw payload received from the gateway, kept for reconciliation.
    pub gateway_payload: Option<serde_json::Value>,

    /// Failure detail from the gateway, when failed.
    pub failure_reason: Option<String>,

    /// When the payment record was created.
    pub created_at: Timestamp,

    /// When the payment was last updated.
    pub updated_at: Timestamp,

    /// When the gateway confirmed the funds.
    pub paid_at: Option<Timestamp>,

    /// When the refund settled.
    pub refunded_at: Option<Timestamp>,
}

impl Payment {
    /// Creates a pending payment with a fresh platform reference.
    pub fn create(
        tenant_id: TenantId,
        order_id: OrderId,
        gateway: GatewayId,
        amount: Money,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: PaymentId::new(),
            tenant_id,
            order_id,
            reference: PaymentReference::generate(),
            gateway,
            gateway_reference: None,
            amount,
            status: PaymentStatus::Pending,
            customer_email: None,
            customer_phone: None,
            gateway_payload: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
            refunded_at: None,
        }
    }

    /// Records the gateway's acceptance of the request.
    ///
    /// # Errors
    ///
    /// Returns error if the payment already reached a settled state.
    pub fn mark_processing(
        &mut self,
        gateway_reference: Option<String>,
    ) -> Result<(), TransitionError> {
        use crate::domain::foundation::StateMachine;
        self.status = self.status.transition_to(PaymentStatus::Processing)?;
        if gateway_reference.is_some() {
            self.gateway_reference = gateway_reference;
        }
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Marks the payment completed after gateway confirmation.
    ///
    /// Idempotent: confirming an already-completed payment changes nothing,
    /// so replayed webhooks and verify-after-webhook races are harmless.
    ///
    /// # Errors
    ///
    /// Returns error if the payment is in a state that can never complete
    /// (failed, cancelled, refunded).
    pub fn complete(&mut self, payload: Option<serde_json::Value>) -> Result<(), TransitionError> {
        use crate::domain::foundation::StateMachine;
        if self.status == PaymentStatus::Completed {
            return Ok(());
        }
        self.status = self.status.transition_to(PaymentStatus::Completed)?;
        self.paid_at = Some(Timestamp::now());
        if payload.is_some() {
            self.gateway_payload = payload;
        }
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Records a definitive gateway failure.
    ///
    /// # Errors
    ///
    /// Returns error if the payment already settled.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        use crate::domain::foundation::StateMachine;
        self.status = self.status.transition_to(PaymentStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Records customer abandonment or cancellation.
    ///
    /// # Errors
    ///
    /// Returns error if the payment already settled.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        use crate::domain::foundation::StateMachine;
        self.status = self.status.transition_to(PaymentStatus::Cancelled)?;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Marks the payment refunded.
    ///
    /// # Errors
    ///
    /// Returns error unless the payment is currently completed.
    pub fn refund(&mut self) -> Result<(), TransitionError> {
        use crate::domain::foundation::StateMachine;
        self.status = self.status.transition_to(PaymentStatus::Refunded)?;
        self.refunded_at = Some(Timestamp::now());
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// True once the gateway confirmed the funds.
    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::CurrencyCode;
    use rust_decimal_macros::dec;

    fn test_payment() -> Payment {
        Payment::create(
            TenantId::new(),
            OrderId::new(),
            GatewayId::MpesaKenya,
            Money::new(dec!(500), CurrencyCode::KES).unwrap(),
        )
    }

    #[test]
    fn create_starts_pending_with_reference() {
        let payment = test_payment();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.reference.as_str().starts_with("VS-"));
        assert!(payment.paid_at.is_none());
        assert!(payment.gateway_reference.is_none());
    }

    #[test]
    fn mark_processing_stores_gateway_reference() {
        let mut payment = test_payment();
        payment
            .mark_processing(Some("ws_CO_12345".to_string()))
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Processing);
        assert_eq!(payment.gateway_reference.as_deref(), Some("ws_CO_12345"));
    }

    #[test]
    fn complete_stamps_paid_at() {
        let mut payment = test_payment();
        payment.complete(None).unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.paid_at.is_some());
    }

    #[test]
    fn complete_twice_keeps_first_paid_at() {
        let mut payment = test_payment();
        payment.complete(None).unwrap();
        let first_paid_at = payment.paid_at;

        payment.complete(None).unwrap();
        assert_eq!(payment.paid_at, first_paid_at);
        assert_eq!(payment.status, PaymentStatus::Completed);
    }

    #[test]
    fn complete_keeps_existing_payload_when_none_given() {
        let mut payment = test_payment();
        payment
            .complete(Some(serde_json::json!({"ResultCode": 0})))
            .unwrap();
        payment.complete(None).unwrap();
        assert!(payment.gateway_payload.is_some());
    }

    #[test]
    fn fail_records_reason() {
        let mut payment = test_payment();
        payment.fail("insufficient funds").unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("insufficient funds"));
    }

    #[test]
    fn failed_payment_cannot_complete() {
        let mut payment = test_payment();
        payment.fail("declined").unwrap();
        assert!(payment.complete(None).is_err());
    }

    #[test]
    fn refund_requires_completion() {
        let mut payment = test_payment();
        assert!(payment.refund().is_err());

        payment.complete(None).unwrap();
        payment.refund().unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert!(payment.refunded_at.is_some());
    }

    #[test]
    fn cancelled_payment_is_terminal() {
        let mut payment = test_payment();
        payment.cancel().unwrap();
        assert!(payment.complete(None).is_err());
        assert!(payment.fail("late failure").is_err());
    }
}

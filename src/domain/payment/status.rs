//! Payment status state machine.
//!
//! Defines all possible payment states and valid transitions across the
//! collection lifecycle, from initiation through settlement or refund.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Status of a payment record.
///
/// The record is persisted as `Pending` once the gateway accepts the
/// initiation request; confirmation arrives later by webhook or verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Gateway accepted the request, nothing confirmed yet.
    Pending,

    /// Gateway accepted the request and the customer is being prompted
    /// (STK push shown, redirect issued).
    Processing,

    /// Funds confirmed by the gateway.
    Completed,

    /// Gateway reported a definitive failure.
    Failed,

    /// Abandoned or cancelled before completion.
    Cancelled,

    /// Funds returned to the customer after completion.
    Refunded,
}

impl PaymentStatus {
    /// True once the gateway has confirmed funds, whether or not they
    /// were later refunded.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Refunded)
    }
}

impl StateMachine for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, target),
            // From PENDING
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Cancelled)
            // From PROCESSING
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
            // From COMPLETED
                | (Completed, Completed) // duplicate confirmation
                | (Completed, Refunded)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentStatus::*;
        match self {
            Pending => vec![Processing, Completed, Failed, Cancelled],
            Processing => vec![Completed, Failed, Cancelled],
            Completed => vec![Completed, Refunded],
            Failed => vec![],
            Cancelled => vec![],
            Refunded => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_complete_directly() {
        let status = PaymentStatus::Pending;
        assert!(status.can_transition_to(&PaymentStatus::Completed));
        assert_eq!(
            status.transition_to(PaymentStatus::Completed).unwrap(),
            PaymentStatus::Completed
        );
    }

    #[test]
    fn pending_can_move_to_processing() {
        let status = PaymentStatus::Pending;
        assert_eq!(
            status.transition_to(PaymentStatus::Processing).unwrap(),
            PaymentStatus::Processing
        );
    }

    #[test]
    fn pending_cannot_be_refunded() {
        let status = PaymentStatus::Pending;
        assert!(!status.can_transition_to(&PaymentStatus::Refunded));
        assert!(status.transition_to(PaymentStatus::Refunded).is_err());
    }

    #[test]
    fn processing_can_fail() {
        let status = PaymentStatus::Processing;
        assert_eq!(
            status.transition_to(PaymentStatus::Failed).unwrap(),
            PaymentStatus::Failed
        );
    }

    #[test]
    fn completed_accepts_duplicate_confirmation() {
        let status = PaymentStatus::Completed;
        assert!(status.can_transition_to(&PaymentStatus::Completed));
    }

    #[test]
    fn only_completed_can_be_refunded() {
        assert!(PaymentStatus::Completed.can_transition_to(&PaymentStatus::Refunded));

        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
        ] {
            assert!(
                !status.can_transition_to(&PaymentStatus::Refunded),
                "{:?} must not be refundable",
                status
            );
        }
    }

    #[test]
    fn completed_cannot_regress_to_failed() {
        assert!(!PaymentStatus::Completed.can_transition_to(&PaymentStatus::Failed));
        assert!(!PaymentStatus::Completed.can_transition_to(&PaymentStatus::Pending));
    }

    #[test]
    fn failed_cancelled_refunded_are_terminal() {
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
        assert!(PaymentStatus::Refunded.is_terminal());
        assert!(!PaymentStatus::Completed.is_terminal());
    }

    #[test]
    fn is_settled_covers_completed_and_refunded() {
        assert!(PaymentStatus::Completed.is_settled());
        assert!(PaymentStatus::Refunded.is_settled());
        assert!(!PaymentStatus::Processing.is_settled());
    }

    #[test]
    fn valid_transitions_are_consistent_with_can_transition_to() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Refunded,
        ] {
            for valid_target in status.valid_transitions() {
                assert!(
                    status.can_transition_to(&valid_target),
                    "can_transition_to should return true for {:?} -> {:?}",
                    status,
                    valid_target
                );
            }
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&PaymentStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}

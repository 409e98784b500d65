//! Tenant subscription status state machine.
//!
//! Mirrors the billing lifecycle driven by WHMCS: signups land in trial,
//! invoices move tenants between active and past_due, and module commands
//! suspend, unsuspend, or cancel the store.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Billing status of a tenant store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Evaluation period before first invoice.
    Trial,

    /// Paid up. Store serves traffic.
    Active,

    /// Invoice overdue, store stays up during the grace period.
    PastDue,

    /// Billing-initiated suspension. Store returns a suspension page.
    Suspended,

    /// Merchant cancelled. Store stays up until period end.
    Cancelled,

    /// Subscription over, store dark until resubscribed.
    Expired,
}

impl SubscriptionStatus {
    /// Returns true if the storefront should serve customer traffic.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trial
                | SubscriptionStatus::Active
                | SubscriptionStatus::PastDue
                | SubscriptionStatus::Cancelled
        )
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From TRIAL
            (Trial, Active)
                | (Trial, Suspended)
                | (Trial, Cancelled)
                | (Trial, Expired)
            // From ACTIVE
                | (Active, Active) // renewal
                | (Active, PastDue)
                | (Active, Suspended)
                | (Active, Cancelled)
                | (Active, Expired)
            // From PAST_DUE
                | (PastDue, Active)
                | (PastDue, Suspended)
                | (PastDue, Cancelled)
                | (PastDue, Expired)
            // From SUSPENDED
                | (Suspended, Active)
                | (Suspended, Cancelled)
                | (Suspended, Expired)
            // From CANCELLED
                | (Cancelled, Active)
                | (Cancelled, Expired)
            // From EXPIRED
                | (Expired, Active) // resubscribe
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Trial => vec![Active, Suspended, Cancelled, Expired],
            Active => vec![Active, PastDue, Suspended, Cancelled, Expired],
            PastDue => vec![Active, Suspended, Cancelled, Expired],
            Suspended => vec![Active, Cancelled, Expired],
            Cancelled => vec![Active, Expired],
            Expired => vec![Active],
        }
    }
}

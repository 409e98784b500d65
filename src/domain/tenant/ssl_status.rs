//! SSL certificate status state machine.
//!
//! Tracks a tenant domain through the issuance pipeline: ownership check,
//! ACME issuance, then serving. Both `pending` and `failed` may re-enter
//! the pipeline, making retries safe.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Certificate status for a tenant's custom domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SslStatus {
    /// No certificate yet, pipeline not started or reset.
    Pending,

    /// DNS ownership check in progress.
    Verifying,

    /// ACME order running against the CA.
    Issuing,

    /// Certificate installed and serving.
    Active,

    /// Pipeline failed. Retriable.
    Failed,
}

impl SslStatus {
    /// True when a new issuance run may start from this state.
    pub fn can_start_issuance(&self) -> bool {
        matches!(self, SslStatus::Pending | SslStatus::Failed)
    }
}

impl StateMachine for SslStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SslStatus::*;
        matches!(
            (self, target),
            (Pending, Verifying)
                | (Verifying, Issuing)
                | (Verifying, Failed)
                | (Issuing, Active)
                | (Issuing, Failed)
                | (Failed, Verifying) // retry
                | (Active, Pending) // revocation or domain change
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SslStatus::*;
        match self {
            Pending => vec![Verifying],
            Verifying => vec![Issuing, Failed],
            Issuing => vec![Active, Failed],
            Active => vec![Pending],
            Failed => vec![Verifying],
        }
    }
}

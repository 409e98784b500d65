//! Reconciliation alerts port.
//!
//! A webhook that references a payment we cannot match means money may have
//! moved without a matching record. Those events must reach an operator, so
//! they are recorded through this port instead of being logged and dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;
use crate::domain::payment::GatewayId;

use super::StoreError;

/// One unmatched gateway event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationGap {
    /// Gateway the event came from.
    pub gateway: GatewayId,

    /// Platform reference carried by the payload, if any.
    pub reference: Option<String>,

    /// Provider-side reference carried by the payload, if any.
    pub gateway_reference: Option<String>,

    /// Why the event could not be applied.
    pub reason: String,

    /// SHA-256 hex digest of the raw payload, for looking it up in
    /// provider dashboards without storing the payload twice.
    pub payload_digest: String,

    /// When the gap was observed.
    pub observed_at: Timestamp,
}

/// Port for recording unmatched gateway events.
#[async_trait]
pub trait ReconciliationAlerts: Send + Sync {
    /// Record one gap for operator review.
    async fn record(&self, gap: ReconciliationGap) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait object safety test
    #[test]
    fn reconciliation_alerts_is_object_safe() {
        fn _accepts_dyn(_alerts: &dyn ReconciliationAlerts) {}
    }
}

//! Notification sink port.
//!
//! Rendering and delivery (mail, SMS) live behind this seam. The core only
//! decides *that* something notable happened and hands over the facts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Money, TenantId};
use crate::domain::payment::PaymentReference;

use super::StoreError;

/// Events worth telling a merchant or operator about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A payment settled.
    PaymentReceived {
        tenant_id: TenantId,
        reference: PaymentReference,
        amount: Money,
    },

    /// A refund settled.
    PaymentRefunded {
        tenant_id: TenantId,
        reference: PaymentReference,
        amount: Money,
    },

    /// Provisioning finished and the store is reachable.
    StoreReady {
        tenant_id: TenantId,
        store_url: String,
        admin_email: String,
    },
}

/// Port for delivering notifications.
///
/// Delivery failures are soft: callers log and continue, they never fail
/// the triggering operation.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification.
    async fn deliver(&self, notification: Notification) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait object safety test
    #[test]
    fn notification_sink_is_object_safe() {
        fn _accepts_dyn(_sink: &dyn NotificationSink) {}
    }

    #[test]
    fn notification_serializes_with_kind_tag() {
        let notification = Notification::StoreReady {
            tenant_id: TenantId::new(),
            store_url: "https://shop.vumashops.com".to_string(),
            admin_email: "owner@example.com".to_string(),
        };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["kind"], "store_ready");
    }
}

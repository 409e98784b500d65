//! In-memory notification sink.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ports::{Notification, NotificationSink, StoreError};

/// In-memory [`NotificationSink`] that collects what it was asked to send.
///
/// `set_error` scripts one delivery failure, consumed by the next call, so
/// callers can prove that delivery problems stay soft.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSink {
    delivered: Arc<RwLock<Vec<Notification>>>,
    next_error: Arc<RwLock<Option<StoreError>>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in order.
    pub async fn delivered(&self) -> Vec<Notification> {
        self.delivered.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.delivered.read().await.len()
    }

    /// Script the next delivery to fail.
    pub async fn set_error(&self, error: StoreError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn deliver(&self, notification: Notification) -> Result<(), StoreError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        self.delivered.write().await.push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::TenantId;

    fn store_ready() -> Notification {
        Notification::StoreReady {
            tenant_id: TenantId::new(),
            store_url: "https://duka.vumashops.com".to_string(),
            admin_email: "owner@dukamoja.co.tz".to_string(),
        }
    }

    #[tokio::test]
    async fn delivered_notifications_are_kept_in_order() {
        let sink = InMemoryNotificationSink::new();
        sink.deliver(store_ready()).await.unwrap();
        sink.deliver(store_ready()).await.unwrap();
        assert_eq!(sink.count().await, 2);
    }

    #[tokio::test]
    async fn scripted_error_fails_exactly_one_delivery() {
        let sink = InMemoryNotificationSink::new();
        sink.set_error(StoreError::backend("smtp down")).await;

        assert!(sink.deliver(store_ready()).await.is_err());
        assert!(sink.deliver(store_ready()).await.is_ok());
        assert_eq!(sink.count().await, 1);
    }
}

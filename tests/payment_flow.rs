//! Integration tests for the payment collection flow.
//!
//! These tests verify the end-to-end path:
//! 1. Storefront checkout initializes a payment through the manager
//! 2. The provider calls back on `POST /webhooks/:gateway`
//! 3. The matched payment settles, the order is marked paid
//! 4. The merchant notification goes out exactly once
//!
//! Uses the mock gateway driver and in-memory stores, with the real Axum
//! router in front.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rust_decimal_macros::dec;
use serde_json::json;
use tower::ServiceExt;

use vumashops_core::adapters::gateways::MockGateway;
use vumashops_core::adapters::http::{webhook_router, WebhookAppState};
use vumashops_core::adapters::memory::{
    InMemoryNotificationSink, InMemoryOrderTracker, InMemoryPaymentStore,
    InMemoryReconciliationAlerts,
};
use vumashops_core::application::{CheckoutRequest, PaymentManager};
use vumashops_core::domain::foundation::{CurrencyCode, Money, OrderId, TenantId};
use vumashops_core::domain::payment::{GatewayId, PaymentReference, PaymentStatus};
use vumashops_core::ports::{Notification, PaymentStore};

// =============================================================================
// Test Infrastructure
// =============================================================================

struct Harness {
    app: Router,
    manager: Arc<PaymentManager>,
    payments: Arc<InMemoryPaymentStore>,
    orders: Arc<InMemoryOrderTracker>,
    notifications: Arc<InMemoryNotificationSink>,
    alerts: Arc<InMemoryReconciliationAlerts>,
}

fn harness() -> Harness {
    let payments = Arc::new(InMemoryPaymentStore::new());
    let orders = Arc::new(InMemoryOrderTracker::new());
    let notifications = Arc::new(InMemoryNotificationSink::new());
    let alerts = Arc::new(InMemoryReconciliationAlerts::new());

    let mut manager = PaymentManager::new(
        payments.clone(),
        orders.clone(),
        notifications.clone(),
        alerts.clone(),
    );
    manager.register(Arc::new(MockGateway::new(GatewayId::Paystack)));
    let manager = Arc::new(manager);

    let app = webhook_router().with_state(WebhookAppState {
        manager: manager.clone(),
    });

    Harness {
        app,
        manager,
        payments,
        orders,
        notifications,
        alerts,
    }
}

fn checkout(tenant_id: TenantId, order_id: OrderId) -> CheckoutRequest {
    CheckoutRequest {
        tenant_id,
        order_id,
        amount: Money::new(dec!(2500), CurrencyCode::KES).unwrap(),
        customer_email: Some("customer@example.com".to_string()),
        customer_phone: None,
        callback_url: "https://core.vumashops.com/webhooks/paystack".to_string(),
        metadata: HashMap::new(),
    }
}

/// Initialize a payment and return its platform reference.
async fn initialized_reference(h: &Harness, tenant_id: TenantId, order_id: OrderId) -> PaymentReference {
    let initiated = h
        .manager
        .initialize_payment(GatewayId::Paystack, checkout(tenant_id, order_id))
        .await
        .unwrap();
    assert!(initiated.success);
    initiated.reference.unwrap()
}

fn provider_callback(reference: &PaymentReference, status: &str) -> Request<Body> {
    let body = json!({ "reference": reference.as_str(), "status": status });
    Request::builder()
        .method("POST")
        .uri("/webhooks/paystack")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn checkout_settles_through_the_webhook_endpoint() {
    let h = harness();
    let tenant_id = TenantId::new();
    let order_id = OrderId::new();
    let reference = initialized_reference(&h, tenant_id, order_id).await;

    let response = h
        .app
        .oneshot(provider_callback(&reference, "success"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let payment = h
        .payments
        .find_by_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert!(h.orders.is_paid(&order_id).await);

    let delivered = h.notifications.delivered().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(
        delivered[0],
        Notification::PaymentReceived {
            tenant_id,
            reference,
            amount: Money::new(dec!(2500), CurrencyCode::KES).unwrap(),
        }
    );
}

#[tokio::test]
async fn retried_webhook_settles_once() {
    let h = harness();
    let order_id = OrderId::new();
    let reference = initialized_reference(&h, TenantId::new(), order_id).await;

    for _ in 0..3 {
        let response = h
            .app
            .clone()
            .oneshot(provider_callback(&reference, "success"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert!(h.orders.is_paid(&order_id).await);
    assert_eq!(h.orders.paid_count().await, 1);
    assert_eq!(h.notifications.count().await, 1);
    assert_eq!(h.alerts.count().await, 0);
}

#[tokio::test]
async fn lost_webhook_is_recovered_by_verification() {
    let h = harness();
    let order_id = OrderId::new();
    let reference = initialized_reference(&h, TenantId::new(), order_id).await;

    // No callback ever arrives; the storefront return page polls instead.
    let verified = h
        .manager
        .verify_payment(GatewayId::Paystack, &reference)
        .await
        .unwrap();

    assert!(verified.success);
    assert!(h.orders.is_paid(&order_id).await);
    assert_eq!(h.notifications.count().await, 1);
}

#[tokio::test]
async fn failed_callback_keeps_the_order_unpaid() {
    let h = harness();
    let order_id = OrderId::new();
    let reference = initialized_reference(&h, TenantId::new(), order_id).await;

    let response = h
        .app
        .oneshot(provider_callback(&reference, "failed"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let payment = h
        .payments
        .find_by_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert!(!h.orders.is_paid(&order_id).await);
    assert_eq!(h.notifications.count().await, 0);
}

#[tokio::test]
async fn settled_payment_refunds_with_a_second_notification() {
    let h = harness();
    let tenant_id = TenantId::new();
    let order_id = OrderId::new();
    let reference = initialized_reference(&h, tenant_id, order_id).await;

    h.app
        .oneshot(provider_callback(&reference, "success"))
        .await
        .unwrap();

    let settled = h
        .payments
        .find_by_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    let refund = h
        .manager
        .refund_payment(&settled.id, None, None)
        .await
        .unwrap();
    assert!(refund.success);

    let payment = h
        .payments
        .find_by_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert!(h.orders.is_refunded(&order_id).await);

    let delivered = h.notifications.delivered().await;
    assert_eq!(delivered.len(), 2);
    assert!(matches!(
        delivered[1],
        Notification::PaymentRefunded { tenant_id: t, .. } if t == tenant_id
    ));
}

#[tokio::test]
async fn stray_callback_is_acknowledged_and_parked_for_reconciliation() {
    let h = harness();
    let stray = PaymentReference::generate();

    let response = h
        .app
        .oneshot(provider_callback(&stray, "success"))
        .await
        .unwrap();

    // The provider must see 200 or it will retry forever.
    assert_eq!(response.status(), StatusCode::OK);

    let gaps = h.alerts.gaps().await;
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].gateway, GatewayId::Paystack);
    assert_eq!(gaps[0].reference.as_deref(), Some(stray.as_str()));
    assert_eq!(h.notifications.count().await, 0);
}

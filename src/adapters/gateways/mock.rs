//! Mock gateway driver for testing.
//!
//! Provides a configurable mock implementation of `GatewayDriver` for unit
//! and integration tests. Supports:
//! - Pre-configured outcomes
//! - Error injection
//! - Call tracking

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::foundation::CurrencyCode;
use crate::domain::payment::GatewayId;
use crate::ports::{
    GatewayDriver, GatewayError, GatewayStatus, InitiateOutcome, InitiateRequest, NextAction,
    RefundOutcome, RefundRequest, VerifyOutcome, VerifyRequest, WebhookDelivery, WebhookOutcome,
};

/// Mock gateway driver for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockGateway::new(GatewayId::Paystack);
///
/// // Script an outcome
/// mock.set_verify_status(GatewayStatus::Failed);
///
/// // Inject errors
/// mock.set_error(GatewayError::network(GatewayId::Paystack, "reset"));
///
/// // Use in tests
/// let result = mock.verify(request).await;
/// assert!(mock.was_called("verify"));
/// ```
pub struct MockGateway {
    id: GatewayId,
    countries: &'static [&'static str],
    currencies: &'static [CurrencyCode],
    refunds: bool,

    /// Inner state (thread-safe for async tests).
    inner: Arc<Mutex<MockState>>,
}

/// Internal mutable state.
#[derive(Default)]
struct MockState {
    /// Next initialization outcome to return.
    next_initiate: Option<InitiateOutcome>,

    /// Next verification outcome to return.
    next_verify: Option<VerifyOutcome>,

    /// Next webhook outcome to return.
    next_webhook: Option<WebhookOutcome>,

    /// Next refund outcome to return.
    next_refund: Option<RefundOutcome>,

    /// Error to return on next call.
    next_error: Option<GatewayError>,

    /// Specific errors by method name.
    method_errors: HashMap<String, GatewayError>,

    /// Track method calls for assertions.
    call_log: Vec<MethodCall>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockGateway {
    /// Create a mock that reports as the given gateway and succeeds at
    /// everything.
    pub fn new(id: GatewayId) -> Self {
        Self {
            id,
            countries: &["KE", "NG", "TZ", "UG"],
            currencies: &[
                CurrencyCode::KES,
                CurrencyCode::NGN,
                CurrencyCode::TZS,
                CurrencyCode::UGX,
            ],
            refunds: true,
            inner: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Restrict the mock to specific countries.
    pub fn with_countries(mut self, countries: &'static [&'static str]) -> Self {
        self.countries = countries;
        self
    }

    /// Restrict the mock to specific currencies.
    pub fn with_currencies(mut self, currencies: &'static [CurrencyCode]) -> Self {
        self.currencies = currencies;
        self
    }

    /// Make the mock report that it cannot refund.
    pub fn without_refunds(mut self) -> Self {
        self.refunds = false;
        self
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Set the outcome to return on the next `initialize` call.
    pub fn set_initiate(&self, outcome: InitiateOutcome) {
        self.inner.lock().unwrap().next_initiate = Some(outcome);
    }

    /// Set the outcome to return on the next `verify` call.
    pub fn set_verify(&self, outcome: VerifyOutcome) {
        self.inner.lock().unwrap().next_verify = Some(outcome);
    }

    /// Shorthand: make the next `verify` call report this status.
    pub fn set_verify_status(&self, status: GatewayStatus) {
        self.set_verify(VerifyOutcome {
            status,
            amount: None,
            gateway_reference: None,
            message: None,
            raw: serde_json::json!({ "mock": true }),
        });
    }

    /// Set the outcome to return on the next `handle_webhook` call.
    pub fn set_webhook(&self, outcome: WebhookOutcome) {
        self.inner.lock().unwrap().next_webhook = Some(outcome);
    }

    /// Set the outcome to return on the next `refund` call.
    pub fn set_refund(&self, outcome: RefundOutcome) {
        self.inner.lock().unwrap().next_refund = Some(outcome);
    }

    /// Set an error to return on the next call to any method.
    pub fn set_error(&self, error: GatewayError) {
        self.inner.lock().unwrap().next_error = Some(error);
    }

    /// Set an error for a specific method.
    pub fn set_method_error(&self, method: &str, error: GatewayError) {
        self.inner
            .lock()
            .unwrap()
            .method_errors
            .insert(method.to_string(), error);
    }

    /// Clear all configured errors.
    pub fn clear_errors(&self) {
        let mut state = self.inner.lock().unwrap();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    /// Get all recorded method calls.
    pub fn calls(&self) -> Vec<MethodCall> {
        self.inner.lock().unwrap().call_log.clone()
    }

    /// Check if a method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .call_log
            .iter()
            .any(|c| c.method == method)
    }

    /// Get count of calls to a method.
    pub fn call_count(&self, method: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().call_log.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.inner.lock().unwrap().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), GatewayError> {
        let mut state = self.inner.lock().unwrap();

        // Check method-specific error first
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }

        // Check global error (consumes it)
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }

        Ok(())
    }
}

impl Clone for MockGateway {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            countries: self.countries,
            currencies: self.currencies,
            refunds: self.refunds,
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl GatewayDriver for MockGateway {
    fn id(&self) -> GatewayId {
        self.id
    }

    fn supported_countries(&self) -> &'static [&'static str] {
        self.countries
    }

    fn supported_currencies(&self) -> &'static [CurrencyCode] {
        self.currencies
    }

    fn supports_refunds(&self) -> bool {
        self.refunds
    }

    async fn initialize(&self, request: InitiateRequest) -> Result<InitiateOutcome, GatewayError> {
        self.record_call(
            "initialize",
            vec![
                request.reference.to_string(),
                request.amount.to_string(),
            ],
        );
        self.check_error("initialize")?;

        let scripted = self.inner.lock().unwrap().next_initiate.take();
        Ok(scripted.unwrap_or_else(|| InitiateOutcome {
            reference: request.reference.clone(),
            gateway_reference: Some(format!("mock_{}", uuid::Uuid::new_v4().simple())),
            next_action: NextAction::RedirectTo {
                authorization_url: format!(
                    "https://pay.mock.test/{}",
                    request.reference.as_str()
                ),
            },
            raw: serde_json::json!({ "mock": true }),
        }))
    }

    async fn verify(&self, request: VerifyRequest) -> Result<VerifyOutcome, GatewayError> {
        self.record_call("verify", vec![request.reference.to_string()]);
        self.check_error("verify")?;

        let scripted = self.inner.lock().unwrap().next_verify.take();
        Ok(scripted.unwrap_or_else(|| VerifyOutcome {
            status: GatewayStatus::Success,
            amount: None,
            gateway_reference: request.gateway_reference,
            message: None,
            raw: serde_json::json!({ "mock": true }),
        }))
    }

    async fn handle_webhook(
        &self,
        delivery: WebhookDelivery,
    ) -> Result<WebhookOutcome, GatewayError> {
        self.record_call(
            "handle_webhook",
            vec![String::from_utf8_lossy(delivery.body())
                .chars()
                .take(50)
                .collect()],
        );
        self.check_error("handle_webhook")?;

        if let Some(outcome) = self.inner.lock().unwrap().next_webhook.take() {
            return Ok(outcome);
        }

        // No scripted outcome; read the fields the drivers would extract
        // straight out of the payload.
        let raw = delivery.json().map_err(|e| {
            GatewayError::invalid_webhook(self.id, format!("body is not JSON: {}", e))
        })?;

        let status = serde_json::from_value::<GatewayStatus>(raw["status"].clone())
            .unwrap_or(GatewayStatus::Unknown);
        let reference = raw["reference"].as_str().and_then(|r| r.parse().ok());
        let gateway_reference = raw["gateway_reference"].as_str().map(String::from);

        Ok(WebhookOutcome {
            reference,
            gateway_reference,
            status,
            raw,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundOutcome, GatewayError> {
        self.record_call("refund", vec![request.reference.to_string()]);
        self.check_error("refund")?;

        let scripted = self.inner.lock().unwrap().next_refund.take();
        Ok(scripted.unwrap_or_else(|| RefundOutcome {
            status: GatewayStatus::Success,
            refund_reference: Some(format!("mock_rf_{}", uuid::Uuid::new_v4().simple())),
            via_disbursement: false,
            raw: serde_json::json!({ "mock": true }),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rust_decimal_macros::dec;

    use crate::domain::foundation::{Money, OrderId, TenantId};
    use crate::domain::payment::PaymentReference;

    fn initiate_request() -> InitiateRequest {
        InitiateRequest {
            tenant_id: TenantId::new(),
            order_id: OrderId::new(),
            reference: PaymentReference::generate(),
            amount: Money::new(dec!(500), CurrencyCode::KES).unwrap(),
            customer_email: Some("customer@example.com".to_string()),
            customer_phone: None,
            callback_url: "https://core.vumashops.com/webhooks/paystack".to_string(),
            metadata: HashMap::new(),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Default Behavior Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn initialize_returns_redirect_by_default() {
        let mock = MockGateway::new(GatewayId::Paystack);
        let request = initiate_request();
        let reference = request.reference.clone();

        let outcome = mock.initialize(request).await.unwrap();

        assert_eq!(outcome.reference, reference);
        assert!(outcome.gateway_reference.unwrap().starts_with("mock_"));
        assert!(matches!(outcome.next_action, NextAction::RedirectTo { .. }));
    }

    #[tokio::test]
    async fn verify_succeeds_by_default() {
        let mock = MockGateway::new(GatewayId::Flutterwave);

        let outcome = mock
            .verify(VerifyRequest {
                reference: PaymentReference::generate(),
                gateway_reference: Some("12345".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(outcome.status, GatewayStatus::Success);
        assert_eq!(outcome.gateway_reference, Some("12345".to_string()));
    }

    #[tokio::test]
    async fn webhook_reads_fields_from_payload() {
        let mock = MockGateway::new(GatewayId::Paystack);
        let reference = PaymentReference::generate();
        let body = format!(
            r#"{{"reference":"{}","gateway_reference":"789","status":"failed"}}"#,
            reference.as_str()
        );

        let outcome = mock
            .handle_webhook(WebhookDelivery::new(HashMap::new(), body.into_bytes()))
            .await
            .unwrap();

        assert_eq!(outcome.reference, Some(reference));
        assert_eq!(outcome.gateway_reference, Some("789".to_string()));
        assert_eq!(outcome.status, GatewayStatus::Failed);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn scripted_verify_outcome_is_returned_once() {
        let mock = MockGateway::new(GatewayId::Paystack);
        mock.set_verify_status(GatewayStatus::Pending);

        let request = VerifyRequest {
            reference: PaymentReference::generate(),
            gateway_reference: None,
        };

        let first = mock.verify(request.clone()).await.unwrap();
        assert_eq!(first.status, GatewayStatus::Pending);

        // The script is consumed; default behavior returns.
        let second = mock.verify(request).await.unwrap();
        assert_eq!(second.status, GatewayStatus::Success);
    }

    #[test]
    fn capability_builders_shape_the_mock() {
        let mock = MockGateway::new(GatewayId::MpesaKenya)
            .with_countries(&["KE"])
            .with_currencies(&[CurrencyCode::KES])
            .without_refunds();

        assert_eq!(mock.id(), GatewayId::MpesaKenya);
        assert_eq!(mock.supported_countries(), &["KE"]);
        assert!(!mock.supports_refunds());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Error Injection Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn set_error_fails_next_call_only() {
        let mock = MockGateway::new(GatewayId::Paystack);
        mock.set_error(GatewayError::network(GatewayId::Paystack, "reset"));

        let failed = mock.initialize(initiate_request()).await;
        assert!(failed.is_err());

        let recovered = mock.initialize(initiate_request()).await;
        assert!(recovered.is_ok());
    }

    #[tokio::test]
    async fn set_method_error_only_affects_method() {
        let mock = MockGateway::new(GatewayId::Paystack);
        mock.set_method_error(
            "refund",
            GatewayError::RefundsUnsupported {
                gateway: GatewayId::Paystack,
                message: "scripted".to_string(),
            },
        );

        assert!(mock.initialize(initiate_request()).await.is_ok());

        let refund = mock
            .refund(RefundRequest {
                reference: PaymentReference::generate(),
                gateway_reference: None,
                amount: None,
                customer_phone: None,
                reason: None,
            })
            .await;
        assert!(refund.is_err());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn tracks_method_calls_with_arguments() {
        let mock = MockGateway::new(GatewayId::Paystack);
        let request = initiate_request();
        let reference = request.reference.to_string();

        mock.initialize(request).await.unwrap();

        assert!(mock.was_called("initialize"));
        assert_eq!(mock.call_count("initialize"), 1);
        assert!(!mock.was_called("verify"));

        let calls = mock.calls();
        assert!(calls[0].args.contains(&reference));
    }

    #[tokio::test]
    async fn clear_calls_resets_log() {
        let mock = MockGateway::new(GatewayId::Paystack);
        mock.initialize(initiate_request()).await.unwrap();
        assert_eq!(mock.call_count("initialize"), 1);

        mock.clear_calls();

        assert_eq!(mock.call_count("initialize"), 0);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let mock = MockGateway::new(GatewayId::Paystack);
        let clone = mock.clone();

        clone.initialize(initiate_request()).await.unwrap();

        assert!(mock.was_called("initialize"));
    }
}

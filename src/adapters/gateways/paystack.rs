//! Paystack gateway driver.
//!
//! Card, bank, and mobile money collections for Nigeria, Ghana, South
//! Africa, and Kenya. Amounts cross the wire in minor units (kobo, pesewas,
//! cents); the customer completes payment on Paystack's hosted checkout.
//!
//! # Security
//!
//! - Webhooks carry an HMAC-SHA512 signature of the raw body in
//!   `x-paystack-signature`, keyed with the secret API key
//! - Signature comparison is constant-time
//! - The secret key is held in `secrecy::SecretString`

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::domain::foundation::{CurrencyCode, Money};
use crate::domain::payment::{GatewayId, PaymentReference};
use crate::ports::{
    GatewayDriver, GatewayError, GatewayStatus, InitiateOutcome, InitiateRequest, NextAction,
    RefundOutcome, RefundRequest, VerifyOutcome, VerifyRequest, WebhookDelivery, WebhookOutcome,
};

use super::transport_error;

type HmacSha512 = Hmac<Sha512>;

/// Paystack API configuration.
#[derive(Clone)]
pub struct PaystackConfig {
    /// Secret API key (sk_live_... or sk_test_...). Also keys the webhook
    /// signature.
    secret_key: SecretString,

    /// Base URL for the Paystack API.
    api_base_url: String,
}

impl PaystackConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: SecretString::new(secret_key.into()),
            api_base_url: "https://api.paystack.co".to_string(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads `PAYSTACK_SECRET_KEY`.
    pub fn from_env() -> Result<Self, std::env::VarError> {
        Ok(Self::new(std::env::var("PAYSTACK_SECRET_KEY")?))
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// Paystack gateway driver.
pub struct PaystackAdapter {
    config: PaystackConfig,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    id: Option<i64>,
    status: String,
    amount: Option<i64>,
    currency: Option<String>,
    gateway_response: Option<String>,
}

impl PaystackAdapter {
    pub fn new(config: PaystackConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// Map a Paystack transaction status onto the canonical set. Total:
    /// codes we have never seen normalize to `Unknown`.
    fn parse_status(status: &str) -> GatewayStatus {
        match status {
            "success" => GatewayStatus::Success,
            "failed" | "abandoned" | "reversed" => GatewayStatus::Failed,
            "pending" | "ongoing" | "processing" | "queued" => GatewayStatus::Pending,
            _ => GatewayStatus::Unknown,
        }
    }

    /// Check HTTP-level failures and unwrap the response envelope.
    async fn read_body(
        &self,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, GatewayError> {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            tracing::error!(status = %status, "Paystack rejected our credentials");
            return Err(GatewayError::authentication(
                GatewayId::Paystack,
                "secret key rejected",
            ));
        }

        if status.is_server_error() {
            return Err(GatewayError::network(
                GatewayId::Paystack,
                format!("Paystack returned {}", status),
            ));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::Paystack,
                format!("response body is not JSON: {}", e),
            )
        })?;

        if !status.is_success() || body["status"] == serde_json::Value::Bool(false) {
            let message = body["message"]
                .as_str()
                .unwrap_or("request rejected")
                .to_string();
            tracing::warn!(http_status = %status, message = %message, "Paystack request failed");
            return Err(GatewayError::declined(GatewayId::Paystack, None, message));
        }

        Ok(body)
    }

    /// Verify the webhook signature: HMAC-SHA512 of the raw body, hex
    /// encoded, keyed with the secret key.
    fn verify_signature(&self, delivery: &WebhookDelivery) -> Result<(), GatewayError> {
        let provided = delivery.header("x-paystack-signature").ok_or_else(|| {
            GatewayError::invalid_webhook(GatewayId::Paystack, "missing x-paystack-signature header")
        })?;

        let mut mac =
            HmacSha512::new_from_slice(self.config.secret_key.expose_secret().as_bytes())
                .expect("HMAC can take key of any size");
        mac.update(delivery.body());
        let expected = hex_encode(&mac.finalize().into_bytes());

        if expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() != 1 {
            tracing::warn!("Invalid Paystack webhook signature");
            return Err(GatewayError::invalid_webhook(
                GatewayId::Paystack,
                "signature mismatch",
            ));
        }

        Ok(())
    }

    fn money_from_minor(minor: i64, code: &str) -> Option<Money> {
        let currency = CurrencyCode::from_code(code)?;
        Money::new(Decimal::new(minor, currency.decimals()), currency).ok()
    }
}

#[async_trait]
impl GatewayDriver for PaystackAdapter {
    fn id(&self) -> GatewayId {
        GatewayId::Paystack
    }

    fn supported_countries(&self) -> &'static [&'static str] {
        &["NG", "GH", "ZA", "KE"]
    }

    fn supported_currencies(&self) -> &'static [CurrencyCode] {
        &[
            CurrencyCode::NGN,
            CurrencyCode::GHS,
            CurrencyCode::ZAR,
            CurrencyCode::KES,
        ]
    }

    fn supports_refunds(&self) -> bool {
        true
    }

    fn min_amount(&self, currency: CurrencyCode) -> Decimal {
        match currency {
            CurrencyCode::NGN => Decimal::from(100),
            CurrencyCode::ZAR => Decimal::from(5),
            CurrencyCode::KES => Decimal::from(5),
            _ => Decimal::ONE,
        }
    }

    async fn initialize(&self, request: InitiateRequest) -> Result<InitiateOutcome, GatewayError> {
        self.check_minimum(&request.amount)?;

        let email = request.customer_email.clone().ok_or_else(|| {
            GatewayError::invalid_request(GatewayId::Paystack, "customer email is required")
        })?;

        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "tenant_id".to_string(),
            serde_json::json!(request.tenant_id.to_string()),
        );
        metadata.insert(
            "order_id".to_string(),
            serde_json::json!(request.order_id.to_string()),
        );
        for (key, value) in &request.metadata {
            metadata.insert(key.clone(), serde_json::json!(value));
        }

        let body = serde_json::json!({
            "email": email,
            "amount": request.amount.minor_units(),
            "currency": request.amount.currency().code(),
            "reference": request.reference.as_str(),
            "callback_url": request.callback_url,
            "metadata": metadata,
        });

        let url = format!("{}/transaction/initialize", self.config.api_base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::Paystack, e))?;

        let raw = self.read_body(response).await?;
        let data: InitializeData = serde_json::from_value(raw["data"].clone()).map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::Paystack,
                format!("unexpected initialize payload: {}", e),
            )
        })?;

        tracing::info!(
            reference = %data.reference,
            "Paystack checkout initialized"
        );

        Ok(InitiateOutcome {
            reference: request.reference,
            // Paystack assigns its numeric transaction id at settlement, not
            // at initialization.
            gateway_reference: None,
            next_action: NextAction::RedirectTo {
                authorization_url: data.authorization_url,
            },
            raw,
        })
    }

    async fn verify(&self, request: VerifyRequest) -> Result<VerifyOutcome, GatewayError> {
        let url = format!(
            "{}/transaction/verify/{}",
            self.config.api_base_url,
            request.reference.as_str()
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::Paystack, e))?;

        let raw = self.read_body(response).await?;
        let data: TransactionData = serde_json::from_value(raw["data"].clone()).map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::Paystack,
                format!("unexpected transaction payload: {}", e),
            )
        })?;

        let amount = match (data.amount, data.currency.as_deref()) {
            (Some(minor), Some(code)) => Self::money_from_minor(minor, code),
            _ => None,
        };

        Ok(VerifyOutcome {
            status: Self::parse_status(&data.status),
            amount,
            gateway_reference: data.id.map(|id| id.to_string()),
            message: data.gateway_response,
            raw,
        })
    }

    async fn handle_webhook(
        &self,
        delivery: WebhookDelivery,
    ) -> Result<WebhookOutcome, GatewayError> {
        self.verify_signature(&delivery)?;

        let raw = delivery.json().map_err(|e| {
            GatewayError::invalid_webhook(GatewayId::Paystack, format!("body is not JSON: {}", e))
        })?;

        let event = raw["event"].as_str().unwrap_or_default();
        let data = &raw["data"];

        // The event name is authoritative for settlements; other events fall
        // back to the embedded transaction status.
        let status = match event {
            "charge.success" => GatewayStatus::Success,
            _ => Self::parse_status(data["status"].as_str().unwrap_or_default()),
        };

        let reference = data["reference"]
            .as_str()
            .and_then(|r| r.parse::<PaymentReference>().ok());
        let gateway_reference = data["id"].as_i64().map(|id| id.to_string());

        tracing::info!(event = %event, status = %status, "Paystack webhook accepted");

        Ok(WebhookOutcome {
            reference,
            gateway_reference,
            status,
            raw,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundOutcome, GatewayError> {
        let mut body = serde_json::json!({
            "transaction": request.reference.as_str(),
        });
        if let Some(amount) = &request.amount {
            body["amount"] = serde_json::json!(amount.minor_units());
        }
        if let Some(reason) = &request.reason {
            body["merchant_note"] = serde_json::json!(reason);
        }

        let url = format!("{}/refund", self.config.api_base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::Paystack, e))?;

        let raw = self.read_body(response).await?;

        let status = match raw["data"]["status"].as_str() {
            Some("processed") => GatewayStatus::Success,
            Some("pending") => GatewayStatus::Pending,
            Some("failed") => GatewayStatus::Failed,
            _ => GatewayStatus::Unknown,
        };

        Ok(RefundOutcome {
            status,
            refund_reference: raw["data"]["id"].as_i64().map(|id| id.to_string()),
            via_disbursement: false,
            raw,
        })
    }
}

/// Encode bytes to hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

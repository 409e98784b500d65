//! Flutterwave gateway driver.
//!
//! The widest-coverage card and mobile money rail on the platform, spanning
//! West, East, and Southern Africa. Amounts cross the wire in major units;
//! the customer completes payment on Flutterwave's hosted page.
//!
//! # Security
//!
//! - Webhooks carry the configured secret hash verbatim in the `verif-hash`
//!   header; comparison is constant-time
//! - The secret key and webhook hash are held in `secrecy::SecretString`

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::domain::foundation::{CurrencyCode, Money};
use crate::domain::payment::{GatewayId, PaymentReference};
use crate::ports::{
    GatewayDriver, GatewayError, GatewayStatus, InitiateOutcome, InitiateRequest, NextAction,
    RefundOutcome, RefundRequest, VerifyOutcome, VerifyRequest, WebhookDelivery, WebhookOutcome,
};

use super::transport_error;

/// Flutterwave API configuration.
#[derive(Clone)]
pub struct FlutterwaveConfig {
    /// Secret API key (FLWSECK-...).
    secret_key: SecretString,

    /// Secret hash delivered verbatim in the `verif-hash` webhook header.
    webhook_hash: SecretString,

    /// Base URL for the Flutterwave API.
    api_base_url: String,
}

impl FlutterwaveConfig {
    pub fn new(secret_key: impl Into<String>, webhook_hash: impl Into<String>) -> Self {
        Self {
            secret_key: SecretString::new(secret_key.into()),
            webhook_hash: SecretString::new(webhook_hash.into()),
            api_base_url: "https://api.flutterwave.com".to_string(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads:
    /// - `FLUTTERWAVE_SECRET_KEY`
    /// - `FLUTTERWAVE_WEBHOOK_HASH`
    pub fn from_env() -> Result<Self, std::env::VarError> {
        Ok(Self::new(
            std::env::var("FLUTTERWAVE_SECRET_KEY")?,
            std::env::var("FLUTTERWAVE_WEBHOOK_HASH")?,
        ))
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// Flutterwave gateway driver.
pub struct FlutterwaveAdapter {
    config: FlutterwaveConfig,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PaymentLinkData {
    link: String,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    id: Option<i64>,
    status: String,
    amount: Option<Decimal>,
    currency: Option<String>,
    processor_response: Option<String>,
}

impl FlutterwaveAdapter {
    pub fn new(config: FlutterwaveConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// Map a Flutterwave transaction status onto the canonical set.
    fn parse_status(status: &str) -> GatewayStatus {
        match status {
            "successful" => GatewayStatus::Success,
            "failed" => GatewayStatus::Failed,
            "pending" => GatewayStatus::Pending,
            _ => GatewayStatus::Unknown,
        }
    }

    /// Check HTTP-level failures and the `status` field of the response
    /// envelope.
    async fn read_body(
        &self,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, GatewayError> {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            tracing::error!(status = %status, "Flutterwave rejected our credentials");
            return Err(GatewayError::authentication(
                GatewayId::Flutterwave,
                "secret key rejected",
            ));
        }

        if status.is_server_error() {
            return Err(GatewayError::network(
                GatewayId::Flutterwave,
                format!("Flutterwave returned {}", status),
            ));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::Flutterwave,
                format!("response body is not JSON: {}", e),
            )
        })?;

        if !status.is_success() || body["status"] == serde_json::Value::String("error".into()) {
            let message = body["message"]
                .as_str()
                .unwrap_or("request rejected")
                .to_string();
            tracing::warn!(http_status = %status, message = %message, "Flutterwave request failed");
            return Err(GatewayError::declined(GatewayId::Flutterwave, None, message));
        }

        Ok(body)
    }

    fn verify_hash(&self, delivery: &WebhookDelivery) -> Result<(), GatewayError> {
        let provided = delivery.header("verif-hash").ok_or_else(|| {
            GatewayError::invalid_webhook(GatewayId::Flutterwave, "missing verif-hash header")
        })?;

        let expected = self.config.webhook_hash.expose_secret();
        if expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() != 1 {
            tracing::warn!("Invalid Flutterwave webhook hash");
            return Err(GatewayError::invalid_webhook(
                GatewayId::Flutterwave,
                "verif-hash mismatch",
            ));
        }

        Ok(())
    }

    /// Resolve the numeric transaction id for a platform reference. Needed
    /// by the refund endpoint, which is keyed by Flutterwave's own id.
    async fn resolve_transaction_id(
        &self,
        reference: &PaymentReference,
    ) -> Result<i64, GatewayError> {
        let outcome = self
            .verify(VerifyRequest {
                reference: reference.clone(),
                gateway_reference: None,
            })
            .await?;

        outcome
            .gateway_reference
            .and_then(|id| id.parse::<i64>().ok())
            .ok_or_else(|| {
                GatewayError::invalid_response(
                    GatewayId::Flutterwave,
                    "transaction id missing from verify response",
                )
            })
    }
}

#[async_trait]
impl GatewayDriver for FlutterwaveAdapter {
    fn id(&self) -> GatewayId {
        GatewayId::Flutterwave
    }

    fn supported_countries(&self) -> &'static [&'static str] {
        &[
            "NG", "GH", "KE", "TZ", "UG", "RW", "ZM", "MW", "ZA", "CM", "SN", "CI",
        ]
    }

    fn supported_currencies(&self) -> &'static [CurrencyCode] {
        &[
            CurrencyCode::NGN,
            CurrencyCode::GHS,
            CurrencyCode::KES,
            CurrencyCode::TZS,
            CurrencyCode::UGX,
            CurrencyCode::RWF,
            CurrencyCode::ZMW,
            CurrencyCode::MWK,
            CurrencyCode::ZAR,
            CurrencyCode::XAF,
            CurrencyCode::XOF,
        ]
    }

    fn supports_refunds(&self) -> bool {
        true
    }

    fn min_amount(&self, currency: CurrencyCode) -> Decimal {
        match currency {
            CurrencyCode::NGN => Decimal::from(100),
            CurrencyCode::UGX => Decimal::from(1000),
            CurrencyCode::RWF => Decimal::from(500),
            CurrencyCode::TZS => Decimal::from(1000),
            CurrencyCode::XAF | CurrencyCode::XOF => Decimal::from(100),
            _ => Decimal::ONE,
        }
    }

    async fn initialize(&self, request: InitiateRequest) -> Result<InitiateOutcome, GatewayError> {
        self.check_minimum(&request.amount)?;

        let email = request.customer_email.clone().ok_or_else(|| {
            GatewayError::invalid_request(GatewayId::Flutterwave, "customer email is required")
        })?;

        let mut meta = serde_json::Map::new();
        meta.insert(
            "tenant_id".to_string(),
            serde_json::json!(request.tenant_id.to_string()),
        );
        meta.insert(
            "order_id".to_string(),
            serde_json::json!(request.order_id.to_string()),
        );
        for (key, value) in &request.metadata {
            meta.insert(key.clone(), serde_json::json!(value));
        }

        let body = serde_json::json!({
            "tx_ref": request.reference.as_str(),
            "amount": request.amount.major_units_string(),
            "currency": request.amount.currency().code(),
            "redirect_url": request.callback_url,
            "customer": {
                "email": email,
                "phonenumber": request.customer_phone,
            },
            "meta": meta,
        });

        let url = format!("{}/v3/payments", self.config.api_base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::Flutterwave, e))?;

        let raw = self.read_body(response).await?;
        let data: PaymentLinkData = serde_json::from_value(raw["data"].clone()).map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::Flutterwave,
                format!("unexpected payment payload: {}", e),
            )
        })?;

        tracing::info!(reference = %request.reference, "Flutterwave payment link created");

        Ok(InitiateOutcome {
            reference: request.reference,
            gateway_reference: None,
            next_action: NextAction::RedirectTo {
                authorization_url: data.link,
            },
            raw,
        })
    }

    async fn verify(&self, request: VerifyRequest) -> Result<VerifyOutcome, GatewayError> {
        let url = format!(
            "{}/v3/transactions/verify_by_reference?tx_ref={}",
            self.config.api_base_url,
            request.reference.as_str()
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::Flutterwave, e))?;

        let raw = self.read_body(response).await?;
        let data: TransactionData = serde_json::from_value(raw["data"].clone()).map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::Flutterwave,
                format!("unexpected transaction payload: {}", e),
            )
        })?;

        let amount = match (data.amount, data.currency.as_deref()) {
            (Some(amount), Some(code)) => CurrencyCode::from_code(code)
                .and_then(|currency| Money::new(amount, currency).ok()),
            _ => None,
        };

        Ok(VerifyOutcome {
            status: Self::parse_status(&data.status),
            amount,
            gateway_reference: data.id.map(|id| id.to_string()),
            message: data.processor_response,
            raw,
        })
    }

    async fn handle_webhook(
        &self,
        delivery: WebhookDelivery,
    ) -> Result<WebhookOutcome, GatewayError> {
        self.verify_hash(&delivery)?;

        let raw = delivery.json().map_err(|e| {
            GatewayError::invalid_webhook(
                GatewayId::Flutterwave,
                format!("body is not JSON: {}", e),
            )
        })?;

        let data = &raw["data"];
        let status = Self::parse_status(data["status"].as_str().unwrap_or_default());
        let reference = data["tx_ref"]
            .as_str()
            .and_then(|r| r.parse::<PaymentReference>().ok());
        let gateway_reference = data["id"].as_i64().map(|id| id.to_string());

        tracing::info!(
            event = %raw["event"].as_str().unwrap_or_default(),
            status = %status,
            "Flutterwave webhook accepted"
        );

        Ok(WebhookOutcome {
            reference,
            gateway_reference,
            status,
            raw,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundOutcome, GatewayError> {
        let transaction_id = match request
            .gateway_reference
            .as_deref()
            .and_then(|id| id.parse::<i64>().ok())
        {
            Some(id) => id,
            None => self.resolve_transaction_id(&request.reference).await?,
        };

        let mut body = serde_json::json!({});
        if let Some(amount) = &request.amount {
            body["amount"] = serde_json::json!(amount.major_units_string());
        }

        let url = format!(
            "{}/v3/transactions/{}/refund",
            self.config.api_base_url, transaction_id
        );
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::Flutterwave, e))?;

        let raw = self.read_body(response).await?;

        let status = match raw["data"]["status"].as_str() {
            Some("completed") => GatewayStatus::Success,
            Some("pending") | Some("processing") => GatewayStatus::Pending,
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

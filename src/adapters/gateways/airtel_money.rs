//! Airtel Money gateway driver.
//!
//! Airtel's Open API binds every call to one market through the `X-Country`
//! and `X-Currency` headers, so a deployment serves exactly the country it
//! was configured for even though Airtel operates across the region.
//! Collections push a PIN prompt to the subscriber; the terminal state is
//! read back with the three-letter codes `TS`, `TIP`, and `TF`.
//!
//! Subscribers are addressed by their local nine-digit number with the
//! dialing prefix stripped, unlike every other mobile money API we speak.
//!
//! Refunds run as disbursements back to the customer's wallet and need the
//! operator's encrypted disbursement PIN.

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::foundation::{CountryCode, CurrencyCode};
use crate::domain::payment::{GatewayId, PaymentReference};
use crate::ports::{
    GatewayDriver, GatewayError, GatewayStatus, InitiateOutcome, InitiateRequest, NextAction,
    RefundOutcome, RefundRequest, VerifyOutcome, VerifyRequest, WebhookDelivery, WebhookOutcome,
};

use super::token_cache::{BearerTokenCache, FetchedToken};
use super::transport_error;

/// Airtel Money API configuration for one market.
#[derive(Clone)]
pub struct AirtelConfig {
    client_id: String,
    client_secret: SecretString,

    /// ISO 3166-1 alpha-2 code sent as `X-Country`, e.g. `KE`.
    country: String,

    /// ISO 4217 code sent as `X-Currency`, e.g. `KES`.
    currency: String,

    /// Dialing prefix stripped when normalizing subscriber numbers,
    /// e.g. `254`.
    dialing_prefix: String,

    /// Encrypted disbursement PIN as issued by the Airtel portal. Present
    /// only when the operator has enabled payouts; unlocks refunds.
    disbursement_pin: Option<SecretString>,

    api_base_url: String,
}

impl AirtelConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        country: impl Into<String>,
        currency: impl Into<String>,
        dialing_prefix: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            country: country.into(),
            currency: currency.into(),
            dialing_prefix: dialing_prefix.into(),
            disbursement_pin: None,
            api_base_url: "https://openapi.airtel.africa".to_string(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads `AIRTEL_CLIENT_ID`, `AIRTEL_CLIENT_SECRET`, `AIRTEL_COUNTRY`,
    /// `AIRTEL_CURRENCY`, and `AIRTEL_DIALING_PREFIX`. The optional
    /// `AIRTEL_DISBURSEMENT_PIN` enables refunds.
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let mut config = Self::new(
            std::env::var("AIRTEL_CLIENT_ID")?,
            std::env::var("AIRTEL_CLIENT_SECRET")?,
            std::env::var("AIRTEL_COUNTRY")?,
            std::env::var("AIRTEL_CURRENCY")?,
            std::env::var("AIRTEL_DIALING_PREFIX")?,
        );

        if let Ok(pin) = std::env::var("AIRTEL_DISBURSEMENT_PIN") {
            config = config.with_disbursement_pin(pin);
        }

        Ok(config)
    }

    /// Set a custom API base URL (for testing, or the staging environment).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Attach the encrypted disbursement PIN, enabling refunds.
    pub fn with_disbursement_pin(mut self, pin: impl Into<String>) -> Self {
        self.disbursement_pin = Some(SecretString::new(pin.into()));
        self
    }
}

fn default_token_lifetime() -> u64 {
    180
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_lifetime")]
    expires_in: u64,
}

/// Airtel Money gateway driver.
pub struct AirtelMoneyAdapter {
    config: AirtelConfig,
    http_client: reqwest::Client,
    token_cache: BearerTokenCache,
}

impl AirtelMoneyAdapter {
    pub fn new(config: AirtelConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            token_cache: BearerTokenCache::new(),
        }
    }

    /// Normalize a phone number to the local nine-digit subscriber form
    /// Airtel expects: no plus sign, no dialing prefix, no leading zero.
    fn normalize_msisdn(&self, raw: &str) -> Option<String> {
        let prefix = self.config.dialing_prefix.as_str();
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

        let local = if let Some(rest) = digits.strip_prefix(prefix) {
            rest.to_string()
        } else if let Some(rest) = digits.strip_prefix('0') {
            rest.to_string()
        } else {
            digits
        };

        (local.len() == 9).then_some(local)
    }

    fn parse_status(code: &str) -> GatewayStatus {
        match code {
            // Transaction Success / Transaction In Progress / Transaction Failed
            "TS" => GatewayStatus::Success,
            "TIP" => GatewayStatus::Pending,
            "TF" => GatewayStatus::Failed,
            _ => GatewayStatus::Unknown,
        }
    }

    async fn fetch_token(&self) -> Result<FetchedToken, GatewayError> {
        let url = format!("{}/auth/oauth2/token", self.config.api_base_url);

        let response = self
            .http_client
            .post(&url)
            .json(&serde_json::json!({
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret.expose_secret(),
                "grant_type": "client_credentials",
            }))
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::AirtelMoney, e))?;

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "Airtel token request rejected");
            return Err(GatewayError::authentication(
                GatewayId::AirtelMoney,
                "client credentials rejected",
            ));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::AirtelMoney,
                format!("unexpected token payload: {}", e),
            )
        })?;

        Ok(FetchedToken {
            token: SecretString::new(token.access_token),
            expires_in_secs: token.expires_in,
        })
    }

    async fn bearer(&self) -> Result<SecretString, GatewayError> {
        self.token_cache.get(|| self.fetch_token()).await
    }

    /// Attach the bearer token and the market headers every data-plane
    /// endpoint requires.
    fn market_request(
        &self,
        builder: reqwest::RequestBuilder,
        token: &SecretString,
    ) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(token.expose_secret())
            .header("X-Country", &self.config.country)
            .header("X-Currency", &self.config.currency)
    }

    /// Parse a response and surface errors. Airtel wraps every body in a
    /// `status` envelope with a `success` flag and a `response_code`.
    async fn read_body(&self, response: reqwest::Response) -> Result<serde_json::Value, GatewayError> {
        let http_status = response.status();

        if http_status == reqwest::StatusCode::UNAUTHORIZED {
            self.token_cache.invalidate().await;
            return Err(GatewayError::authentication(
                GatewayId::AirtelMoney,
                "access token rejected",
            ));
        }

        if http_status.is_server_error() {
            return Err(GatewayError::network(
                GatewayId::AirtelMoney,
                format!("Airtel returned {}", http_status),
            ));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::AirtelMoney,
                format!("response body is not JSON: {}", e),
            )
        })?;

        let success = body["status"]["success"]
            .as_bool()
            .unwrap_or(http_status.is_success());
        if !http_status.is_success() || !success {
            let message = body["status"]["message"]
                .as_str()
                .unwrap_or("request rejected")
                .to_string();
            let code = body["status"]["response_code"].as_str().map(String::from);
            tracing::warn!(
                http_status = %http_status,
                response_code = code.as_deref().unwrap_or("none"),
                "Airtel request failed"
            );
            return Err(GatewayError::declined(GatewayId::AirtelMoney, code, message));
        }

        Ok(body)
    }
}

#[async_trait]
impl GatewayDriver for AirtelMoneyAdapter {
    fn id(&self) -> GatewayId {
        GatewayId::AirtelMoney
    }

    fn supported_countries(&self) -> &'static [&'static str] {
        &["KE", "TZ", "UG", "RW", "ZM", "MW"]
    }

    fn supported_currencies(&self) -> &'static [CurrencyCode] {
        &[
            CurrencyCode::KES,
            CurrencyCode::TZS,
            CurrencyCode::UGX,
            CurrencyCode::RWF,
            CurrencyCode::ZMW,
            CurrencyCode::MWK,
        ]
    }

    /// Available only for the market this deployment was configured for.
    /// The static lists describe Airtel's regional footprint; the headers
    /// pin every call to one country and currency.
    fn is_available(&self, country: &CountryCode, currency: CurrencyCode) -> bool {
        country.as_str() == self.config.country && currency.code() == self.config.currency
    }

    fn supports_refunds(&self) -> bool {
        self.config.disbursement_pin.is_some()
    }

    fn min_amount(&self, currency: CurrencyCode) -> Decimal {
        match currency {
            CurrencyCode::KES => Decimal::from(10),
            CurrencyCode::TZS | CurrencyCode::UGX => Decimal::from(1000),
            CurrencyCode::RWF => Decimal::from(500),
            CurrencyCode::MWK => Decimal::from(100),
            _ => Decimal::ONE,
        }
    }

    async fn initialize(&self, request: InitiateRequest) -> Result<InitiateOutcome, GatewayError> {
        self.check_minimum(&request.amount)?;

        if request.amount.currency().code() != self.config.currency {
            return Err(GatewayError::UnsupportedCurrency {
                gateway: GatewayId::AirtelMoney,
                currency: request.amount.currency(),
            });
        }

        let msisdn = request
            .customer_phone
            .as_deref()
            .and_then(|p| self.normalize_msisdn(p))
            .ok_or_else(|| {
                GatewayError::invalid_request(
                    GatewayId::AirtelMoney,
                    "a valid Airtel subscriber number is required",
                )
            })?;

        let token = self.bearer().await?;

        let body = serde_json::json!({
            "reference": format!("Order {}", request.order_id),
            "subscriber": {
                "country": self.config.country,
                "currency": self.config.currency,
                "msisdn": msisdn,
            },
            "transaction": {
                "amount": request.amount.major_units_ceil(),
                "country": self.config.country,
                "currency": self.config.currency,
                "id": request.reference.as_str(),
            },
        });

        let url = format!("{}/merchant/v1/payments/", self.config.api_base_url);
        let response = self
            .market_request(self.http_client.post(&url), &token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::AirtelMoney, e))?;

        let raw = self.read_body(response).await?;

        // The push carries our reference as the transaction id; Airtel's
        // own id only appears once the subscriber has responded.
        Ok(InitiateOutcome {
            reference: request.reference,
            gateway_reference: None,
            next_action: NextAction::CustomerPrompt {
                instructions: "Enter your Airtel Money PIN on your phone to approve the payment"
                    .to_string(),
            },
            raw,
        })
    }

    async fn verify(&self, request: VerifyRequest) -> Result<VerifyOutcome, GatewayError> {
        let token = self.bearer().await?;

        let url = format!(
            "{}/standard/v1/payments/{}",
            self.config.api_base_url,
            request.reference.as_str()
        );
        let response = self
            .market_request(self.http_client.get(&url), &token)
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::AirtelMoney, e))?;

        let raw = self.read_body(response).await?;
        let transaction = &raw["data"]["transaction"];

        Ok(VerifyOutcome {
            status: Self::parse_status(transaction["status"].as_str().unwrap_or_default()),
            // The status endpoint reports no amount.
            amount: None,
            gateway_reference: transaction["airtel_money_id"].as_str().map(String::from),
            message: transaction["message"].as_str().map(String::from),
            raw,
        })
    }

    async fn handle_webhook(
        &self,
        delivery: WebhookDelivery,
    ) -> Result<WebhookOutcome, GatewayError> {
        let raw = delivery.json().map_err(|e| {
            GatewayError::invalid_webhook(
                GatewayId::AirtelMoney,
                format!("body is not JSON: {}", e),
            )
        })?;

        let transaction = &raw["transaction"];
        if !transaction.is_object() {
            return Err(GatewayError::invalid_webhook(
                GatewayId::AirtelMoney,
                "missing transaction object",
            ));
        }

        let status = Self::parse_status(transaction["status_code"].as_str().unwrap_or_default());
        let reference = transaction["id"]
            .as_str()
            .and_then(|r| r.parse::<PaymentReference>().ok());
        let gateway_reference = transaction["airtel_money_id"].as_str().map(String::from);

        // Airtel callbacks are unsigned; log for audit and rely on
        // verification-by-query before money moves.
        tracing::info!(
            status = %status,
            transaction_id = transaction["id"].as_str().unwrap_or_default(),
            "Airtel callback received"
        );

        Ok(WebhookOutcome {
            reference,
            gateway_reference,
            status,
            raw,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundOutcome, GatewayError> {
        let pin = self.config.disbursement_pin.as_ref().ok_or_else(|| {
            GatewayError::RefundsUnsupported {
                gateway: GatewayId::AirtelMoney,
                message: "the disbursement PIN is not configured".to_string(),
            }
        })?;

        let msisdn = request
            .customer_phone
            .as_deref()
            .and_then(|p| self.normalize_msisdn(p))
            .ok_or_else(|| {
                GatewayError::invalid_request(
                    GatewayId::AirtelMoney,
                    "the customer's phone number is required to return funds",
                )
            })?;

        let amount = request.amount.as_ref().ok_or_else(|| {
            GatewayError::invalid_request(
                GatewayId::AirtelMoney,
                "an explicit amount is required for a disbursement refund",
            )
        })?;

        let token = self.bearer().await?;
        let transfer_id = Uuid::new_v4().simple().to_string();

        let body = serde_json::json!({
            "payee": {
                "msisdn": msisdn,
            },
            "reference": request.reference.as_str(),
            "pin": pin.expose_secret(),
            "transaction": {
                "amount": amount.major_units_ceil(),
                "id": transfer_id,
            },
        });

        let url = format!("{}/standard/v1/disbursements/", self.config.api_base_url);
        let response = self
            .market_request(self.http_client.post(&url), &token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::AirtelMoney, e))?;

        let raw = self.read_body(response).await?;
        let status =
            Self::parse_status(raw["data"]["transaction"]["status"].as_str().unwrap_or("TIP"));

        tracing::info!(
            transfer_id = %transfer_id,
            reference = %request.reference,
            "Airtel refund disbursement submitted"
        );

        Ok(RefundOutcome {
            status,
            refund_reference: Some(transfer_id),
            via_disbursement: true,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use rust_decimal_macros::dec;

    use crate::domain::foundation::{Money, OrderId, TenantId};

    fn test_config() -> AirtelConfig {
        AirtelConfig::new("client-id", "client-secret", "KE", "KES", "254")
    }

    fn test_adapter() -> AirtelMoneyAdapter {
        AirtelMoneyAdapter::new(test_config())
    }

    // ════════════════════════════════════════════════════════════════════════
    // Phone Normalization Tests
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn normalizes_to_local_nine_digit_form() {
        let adapter = test_adapter();
        assert_eq!(
            adapter.normalize_msisdn("+254712345678"),
            Some("712345678".to_string())
        );
        assert_eq!(
            adapter.normalize_msisdn("0712 345 678"),
            Some("712345678".to_string())
        );
        assert_eq!(
            adapter.normalize_msisdn("712345678"),
            Some("712345678".to_string())
        );
    }

    #[test]
    fn prefix_follows_market_configuration() {
        let adapter = AirtelMoneyAdapter::new(AirtelConfig::new(
            "client-id",
            "client-secret",
            "TZ",
            "TZS",
            "255",
        ));
        assert_eq!(
            adapter.normalize_msisdn("255782123456"),
            Some("782123456".to_string())
        );
    }

    #[test]
    fn rejects_malformed_numbers() {
        let adapter = test_adapter();
        assert_eq!(adapter.normalize_msisdn("12345"), None);
        assert_eq!(adapter.normalize_msisdn("2547123456789012"), None);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Status Mapping Tests
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn status_mapping_is_total() {
        assert_eq!(AirtelMoneyAdapter::parse_status("TS"), GatewayStatus::Success);
        assert_eq!(AirtelMoneyAdapter::parse_status("TIP"), GatewayStatus::Pending);
        assert_eq!(AirtelMoneyAdapter::parse_status("TF"), GatewayStatus::Failed);
        assert_eq!(
            AirtelMoneyAdapter::parse_status("DP00800001001"),
            GatewayStatus::Unknown
        );
    }

    // ════════════════════════════════════════════════════════════════════════
    // Market Binding Tests
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn available_only_for_the_configured_market() {
        let adapter = test_adapter();
        let kenya = CountryCode::new("KE").unwrap();
        let tanzania = CountryCode::new("TZ").unwrap();

        assert!(adapter.is_available(&kenya, CurrencyCode::KES));
        assert!(!adapter.is_available(&kenya, CurrencyCode::TZS));
        assert!(!adapter.is_available(&tanzania, CurrencyCode::TZS));
    }

    #[tokio::test]
    async fn initialize_rejects_foreign_currency() {
        let adapter =
            AirtelMoneyAdapter::new(test_config().with_base_url("http://192.0.2.1:1"));

        let request = InitiateRequest {
            tenant_id: TenantId::new(),
            order_id: OrderId::new(),
            reference: PaymentReference::generate(),
            amount: Money::new(dec!(5000), CurrencyCode::TZS).unwrap(),
            customer_email: None,
            customer_phone: Some("0712345678".to_string()),
            callback_url: "https://core.vumashops.com/webhooks/airtel_money".to_string(),
            metadata: HashMap::new(),
        };

        let err = adapter.initialize(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedCurrency { .. }));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Local Validation Tests
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn initialize_requires_a_valid_phone() {
        let adapter =
            AirtelMoneyAdapter::new(test_config().with_base_url("http://192.0.2.1:1"));

        let request = InitiateRequest {
            tenant_id: TenantId::new(),
            order_id: OrderId::new(),
            reference: PaymentReference::generate(),
            amount: Money::new(dec!(500), CurrencyCode::KES).unwrap(),
            customer_email: None,
            customer_phone: Some("not-a-number".to_string()),
            callback_url: "https://core.vumashops.com/webhooks/airtel_money".to_string(),
            metadata: HashMap::new(),
        };

        let err = adapter.initialize(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest { .. }));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Refund Capability Tests
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn refunds_require_the_disbursement_pin() {
        assert!(!test_adapter().supports_refunds());

        let with_pin =
            AirtelMoneyAdapter::new(test_config().with_disbursement_pin("encrypted-pin"));
        assert!(with_pin.supports_refunds());
    }

    #[tokio::test]
    async fn refund_without_pin_is_unsupported() {
        let adapter =
            AirtelMoneyAdapter::new(test_config().with_base_url("http://192.0.2.1:1"));

        let err = adapter
            .refund(RefundRequest {
                reference: PaymentReference::generate(),
                gateway_reference: None,
                amount: Some(Money::new(dec!(500), CurrencyCode::KES).unwrap()),
                customer_phone: Some("0712345678".to_string()),
                reason: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::RefundsUnsupported { .. }));
    }

    #[tokio::test]
    async fn refund_requires_phone_and_amount() {
        let adapter = AirtelMoneyAdapter::new(
            test_config()
                .with_disbursement_pin("encrypted-pin")
                .with_base_url("http://192.0.2.1:1"),
        );

        let missing_phone = adapter
            .refund(RefundRequest {
                reference: PaymentReference::generate(),
                gateway_reference: None,
                amount: Some(Money::new(dec!(500), CurrencyCode::KES).unwrap()),
                customer_phone: None,
                reason: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(missing_phone, GatewayError::InvalidRequest { .. }));

        let missing_amount = adapter
            .refund(RefundRequest {
                reference: PaymentReference::generate(),
                gateway_reference: None,
                amount: None,
                customer_phone: Some("0712345678".to_string()),
                reason: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(missing_amount, GatewayError::InvalidRequest { .. }));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Webhook Tests
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn successful_callback_is_normalized() {
        let adapter = test_adapter();
        let reference = PaymentReference::generate();
        let body = format!(
            r#"{{
                "transaction": {{
                    "id": "{}",
                    "message": "Paid KES 500",
                    "status_code": "TS",
                    "airtel_money_id": "MP210603.1234.L06941"
                }}
            }}"#,
            reference.as_str()
        );

        let outcome = adapter
            .handle_webhook(WebhookDelivery::new(HashMap::new(), body.into_bytes()))
            .await
            .unwrap();

        assert_eq!(outcome.status, GatewayStatus::Success);
        assert_eq!(outcome.reference, Some(reference));
        assert_eq!(
            outcome.gateway_reference,
            Some("MP210603.1234.L06941".to_string())
        );
    }

    #[tokio::test]
    async fn failed_callback_maps_to_failed() {
        let adapter = test_adapter();
        let body = r#"{
            "transaction": {
                "id": "VS-abc123",
                "message": "Insufficient balance",
                "status_code": "TF"
            }
        }"#;

        let outcome = adapter
            .handle_webhook(WebhookDelivery::new(HashMap::new(), body.as_bytes().to_vec()))
            .await
            .unwrap();

        assert_eq!(outcome.status, GatewayStatus::Failed);
        assert_eq!(outcome.gateway_reference, None);
    }

    #[tokio::test]
    async fn callback_without_transaction_is_rejected() {
        let adapter = test_adapter();

        let err = adapter
            .handle_webhook(WebhookDelivery::new(
                HashMap::new(),
                br#"{"event":"collection"}"#.to_vec(),
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::InvalidWebhook { .. }));
    }
}

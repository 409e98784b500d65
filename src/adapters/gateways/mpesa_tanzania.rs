//! M-Pesa Tanzania gateway driver (Vodacom OpenAPI).
//!
//! Collections run as C2B single-stage USSD pushes keyed by a session token
//! obtained from the portal-encrypted API key. Unlike the Kenyan rail, the
//! reversal endpoint is a true refund, so no disbursement credentials are
//! needed. Amounts are whole shillings, rounded up.

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::domain::foundation::CurrencyCode;
use crate::domain::payment::{GatewayId, PaymentReference};
use crate::ports::{
    GatewayDriver, GatewayError, GatewayStatus, InitiateOutcome, InitiateRequest, NextAction,
    RefundOutcome, RefundRequest, VerifyOutcome, VerifyRequest, WebhookDelivery, WebhookOutcome,
};

use super::token_cache::{BearerTokenCache, FetchedToken};
use super::transport_error;

/// Session lifetime as provisioned on the Vodacom portal. The response
/// itself does not report one.
const SESSION_LIFETIME_SECS: u64 = 3600;

/// Vodacom OpenAPI configuration.
#[derive(Clone)]
pub struct MpesaTanzaniaConfig {
    /// Portal-encrypted API key, sent as the bearer on the session request.
    /// The portal performs the RSA wrapping; this driver treats the value
    /// as opaque.
    api_key: SecretString,

    /// Organization shortcode collecting the funds.
    service_provider_code: String,

    /// Base URL including the market segment, e.g.
    /// `https://openapi.m-pesa.com/openapi/ipg/v2/vodacomTZN`.
    api_base_url: String,
}

impl MpesaTanzaniaConfig {
    pub fn new(api_key: impl Into<String>, service_provider_code: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            service_provider_code: service_provider_code.into(),
            api_base_url: "https://openapi.m-pesa.com/openapi/ipg/v2/vodacomTZN".to_string(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads:
    /// - `MPESA_TZ_API_KEY`
    /// - `MPESA_TZ_SERVICE_PROVIDER_CODE`
    pub fn from_env() -> Result<Self, std::env::VarError> {
        Ok(Self::new(
            std::env::var("MPESA_TZ_API_KEY")?,
            std::env::var("MPESA_TZ_SERVICE_PROVIDER_CODE")?,
        ))
    }

    /// Set a custom API base URL (for testing, or the sandbox).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// M-Pesa Tanzania gateway driver.
pub struct MpesaTanzaniaAdapter {
    config: MpesaTanzaniaConfig,
    http_client: reqwest::Client,
    session_cache: BearerTokenCache,
}

impl MpesaTanzaniaAdapter {
    pub fn new(config: MpesaTanzaniaConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            session_cache: BearerTokenCache::new(),
        }
    }

    /// Normalize a customer phone number to the `2557XXXXXXXX` form the
    /// OpenAPI requires.
    fn normalize_msisdn(raw: &str) -> Option<String> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

        let msisdn = if digits.starts_with("255") {
            digits
        } else if let Some(rest) = digits.strip_prefix('0') {
            format!("255{}", rest)
        } else if digits.len() == 9 {
            format!("255{}", digits)
        } else {
            digits
        };

        let valid = msisdn.len() == 12 && msisdn.starts_with("255");
        valid.then_some(msisdn)
    }

    /// Map an `output_ResponseCode` onto the canonical set. `INS-0` is the
    /// only success; `INS-6` is the documented transaction failure; every
    /// other code is treated as undetermined.
    fn parse_ins_code(code: &str) -> GatewayStatus {
        match code {
            "INS-0" => GatewayStatus::Success,
            "INS-6" => GatewayStatus::Failed,
            _ => GatewayStatus::Unknown,
        }
    }

    async fn fetch_session(&self) -> Result<FetchedToken, GatewayError> {
        let url = format!("{}/getSession/", self.config.api_base_url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::MpesaTanzania, e))?;

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "Vodacom session request rejected");
            return Err(GatewayError::authentication(
                GatewayId::MpesaTanzania,
                "API key rejected",
            ));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::MpesaTanzania,
                format!("unexpected session payload: {}", e),
            )
        })?;

        let session_id = body["output_SessionID"].as_str().ok_or_else(|| {
            GatewayError::authentication(GatewayId::MpesaTanzania, "no session id issued")
        })?;

        Ok(FetchedToken {
            token: SecretString::new(session_id.to_string()),
            expires_in_secs: SESSION_LIFETIME_SECS,
        })
    }

    async fn session(&self) -> Result<SecretString, GatewayError> {
        self.session_cache.get(|| self.fetch_session()).await
    }

    async fn read_body(
        &self,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, GatewayError> {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.session_cache.invalidate().await;
            return Err(GatewayError::authentication(
                GatewayId::MpesaTanzania,
                "session rejected",
            ));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::MpesaTanzania,
                format!("response body is not JSON: {}", e),
            )
        })?;

        if !status.is_success() {
            let code = body["output_ResponseCode"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let message = body["output_ResponseDesc"]
                .as_str()
                .unwrap_or("request rejected")
                .to_string();
            tracing::warn!(
                http_status = %status,
                response_code = %code,
                message = %message,
                "Vodacom request failed"
            );
            return Err(GatewayError::declined(
                GatewayId::MpesaTanzania,
                Some(code).filter(|c| !c.is_empty()),
                message,
            ));
        }

        Ok(body)
    }
}

#[async_trait]
impl GatewayDriver for MpesaTanzaniaAdapter {
    fn id(&self) -> GatewayId {
        GatewayId::MpesaTanzania
    }

    fn supported_countries(&self) -> &'static [&'static str] {
        &["TZ"]
    }

    fn supported_currencies(&self) -> &'static [CurrencyCode] {
        &[CurrencyCode::TZS]
    }

    fn supports_refunds(&self) -> bool {
        true
    }

    fn min_amount(&self, _currency: CurrencyCode) -> Decimal {
        Decimal::from(1000)
    }

    async fn initialize(&self, request: InitiateRequest) -> Result<InitiateOutcome, GatewayError> {
        self.check_minimum(&request.amount)?;

        let phone = request
            .customer_phone
            .as_deref()
            .and_then(Self::normalize_msisdn)
            .ok_or_else(|| {
                GatewayError::invalid_request(
                    GatewayId::MpesaTanzania,
                    "a valid Tanzanian phone number is required for a USSD push",
                )
            })?;

        let session = self.session().await?;

        let body = serde_json::json!({
            "input_Amount": request.amount.major_units_ceil().to_string(),
            "input_Country": "TZN",
            "input_Currency": "TZS",
            "input_CustomerMSISDN": phone,
            "input_ServiceProviderCode": self.config.service_provider_code,
            "input_ThirdPartyConversationID": request.reference.as_str(),
            "input_TransactionReference": request.reference.as_str(),
            "input_PurchasedItemsDesc": format!("Order {}", request.order_id),
        });

        let url = format!("{}/c2bPayment/singleStage/", self.config.api_base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(session.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::MpesaTanzania, e))?;

        let raw = self.read_body(response).await?;

        let code = raw["output_ResponseCode"].as_str().unwrap_or_default();
        if code != "INS-0" {
            let message = raw["output_ResponseDesc"]
                .as_str()
                .unwrap_or("payment push rejected")
                .to_string();
            return Err(GatewayError::declined(
                GatewayId::MpesaTanzania,
                Some(code.to_string()),
                message,
            ));
        }

        let transaction_id = raw["output_TransactionID"].as_str().map(String::from);

        tracing::info!(
            transaction_id = transaction_id.as_deref().unwrap_or_default(),
            "M-Pesa Tanzania payment push accepted"
        );

        Ok(InitiateOutcome {
            reference: request.reference,
            gateway_reference: transaction_id,
            next_action: NextAction::CustomerPrompt {
                instructions: "Confirm the payment with your M-Pesa PIN on your phone".to_string(),
            },
            raw,
        })
    }

    async fn verify(&self, request: VerifyRequest) -> Result<VerifyOutcome, GatewayError> {
        let query_reference = request
            .gateway_reference
            .clone()
            .unwrap_or_else(|| request.reference.as_str().to_string());

        let session = self.session().await?;
        let conversation_id = Uuid::new_v4().simple().to_string();

        let url = format!("{}/queryTransactionStatus/", self.config.api_base_url);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(session.expose_secret())
            .query(&[
                ("input_QueryReference", query_reference.as_str()),
                (
                    "input_ServiceProviderCode",
                    self.config.service_provider_code.as_str(),
                ),
                ("input_Country", "TZN"),
                ("input_ThirdPartyConversationID", conversation_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::MpesaTanzania, e))?;

        let raw = self.read_body(response).await?;

        let code = raw["output_ResponseCode"].as_str().unwrap_or_default();

        Ok(VerifyOutcome {
            status: Self::parse_ins_code(code),
            amount: None,
            gateway_reference: raw["output_TransactionID"]
                .as_str()
                .map(String::from)
                .or(request.gateway_reference),
            message: raw["output_ResponseDesc"].as_str().map(String::from),
            raw,
        })
    }

    async fn handle_webhook(
        &self,
        delivery: WebhookDelivery,
    ) -> Result<WebhookOutcome, GatewayError> {
        let raw = delivery.json().map_err(|e| {
            GatewayError::invalid_webhook(
                GatewayId::MpesaTanzania,
                format!("body is not JSON: {}", e),
            )
        })?;

        if raw["output_ResponseCode"].is_null() {
            return Err(GatewayError::invalid_webhook(
                GatewayId::MpesaTanzania,
                "missing output_ResponseCode",
            ));
        }

        let code = raw["output_ResponseCode"].as_str().unwrap_or_default();
        let reference = raw["output_ThirdPartyConversationID"]
            .as_str()
            .and_then(|r| r.parse::<PaymentReference>().ok());
        let gateway_reference = raw["output_TransactionID"].as_str().map(String::from);

        // Vodacom result callbacks are unsigned; log for audit and rely on
        // verification-by-query before money moves.
        tracing::info!(
            response_code = %code,
            transaction_id = gateway_reference.as_deref().unwrap_or_default(),
            "M-Pesa Tanzania result callback received"
        );

        Ok(WebhookOutcome {
            reference,
            gateway_reference,
            status: Self::parse_ins_code(code),
            raw,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundOutcome, GatewayError> {
        let transaction_id = request.gateway_reference.clone().ok_or_else(|| {
            GatewayError::invalid_request(
                GatewayId::MpesaTanzania,
                "a reversal requires the original transaction id",
            )
        })?;

        let session = self.session().await?;

        let mut body = serde_json::json!({
            "input_TransactionID": transaction_id,
            "input_Country": "TZN",
            "input_ServiceProviderCode": self.config.service_provider_code,
            "input_ThirdPartyConversationID": Uuid::new_v4().simple().to_string(),
        });
        if let Some(amount) = &request.amount {
            body["input_ReversalAmount"] =
                serde_json::json!(amount.major_units_ceil().to_string());
        }

        let url = format!("{}/reversal/", self.config.api_base_url);
        let response = self
            .http_client
            .put(&url)
            .bearer_auth(session.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::MpesaTanzania, e))?;

        let raw = self.read_body(response).await?;
        let code = raw["output_ResponseCode"].as_str().unwrap_or_default();

        tracing::info!(
            original_transaction_id = %transaction_id,
            response_code = %code,
            "M-Pesa Tanzania reversal submitted"
        );

        Ok(RefundOutcome {
            status: Self::parse_ins_code(code),
            refund_reference: raw["output_TransactionID"].as_str().map(String::from),
            via_disbursement: false,
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

    // ════════════════════════════════════════════════════════════════════════
    // Phone Normalization Tests
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn normalizes_local_format() {
        assert_eq!(
            MpesaTanzaniaAdapter::normalize_msisdn("0744553111"),
            Some("255744553111".to_string())
        );
    }

    #[test]
    fn normalizes_international_format() {
        assert_eq!(
            MpesaTanzaniaAdapter::normalize_msisdn("+255 744 553 111"),
            Some("255744553111".to_string())
        );
    }

    #[test]
    fn normalizes_bare_subscriber_number() {
        assert_eq!(
            MpesaTanzaniaAdapter::normalize_msisdn("744553111"),
            Some("255744553111".to_string())
        );
    }

    #[test]
    fn rejects_kenyan_number() {
        assert_eq!(MpesaTanzaniaAdapter::normalize_msisdn("254712345678"), None);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Status Mapping Tests
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn ins_code_mapping_is_total() {
        assert_eq!(
            MpesaTanzaniaAdapter::parse_ins_code("INS-0"),
            GatewayStatus::Success
        );
        assert_eq!(
            MpesaTanzaniaAdapter::parse_ins_code("INS-6"),
            GatewayStatus::Failed
        );
        // Undetermined codes must never be treated as failures.
        assert_eq!(
            MpesaTanzaniaAdapter::parse_ins_code("INS-2006"),
            GatewayStatus::Unknown
        );
        assert_eq!(
            MpesaTanzaniaAdapter::parse_ins_code(""),
            GatewayStatus::Unknown
        );
    }

    // ════════════════════════════════════════════════════════════════════════
    // Local Validation Tests
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn initialize_rejects_below_minimum_before_any_network_call() {
        let adapter = MpesaTanzaniaAdapter::new(
            MpesaTanzaniaConfig::new("api-key", "000000").with_base_url("http://192.0.2.1:1"),
        );

        let request = InitiateRequest {
            tenant_id: TenantId::new(),
            order_id: OrderId::new(),
            reference: PaymentReference::generate(),
            amount: Money::new(dec!(500), CurrencyCode::TZS).unwrap(),
            customer_email: None,
            customer_phone: Some("0744553111".to_string()),
            callback_url: "https://core.vumashops.com/webhooks/mpesa_tanzania".to_string(),
            metadata: HashMap::new(),
        };

        let err = adapter.initialize(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::BelowMinimum { .. }));
    }

    #[tokio::test]
    async fn refund_requires_original_transaction_id() {
        let adapter = MpesaTanzaniaAdapter::new(
            MpesaTanzaniaConfig::new("api-key", "000000").with_base_url("http://192.0.2.1:1"),
        );

        let err = adapter
            .refund(RefundRequest {
                reference: PaymentReference::generate(),
                gateway_reference: None,
                amount: None,
                customer_phone: None,
                reason: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::InvalidRequest { .. }));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Webhook Tests
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn result_callback_is_normalized() {
        let adapter = MpesaTanzaniaAdapter::new(MpesaTanzaniaConfig::new("api-key", "000000"));
        let reference = PaymentReference::generate();
        let body = format!(
            r#"{{
                "output_ResponseCode": "INS-0",
                "output_ResponseDesc": "Request processed successfully",
                "output_TransactionID": "4iUThBRRWXMg",
                "output_ConversationID": "d3502e5958774f7ba228d83d0d689761",
                "output_ThirdPartyConversationID": "{}"
            }}"#,
            reference.as_str()
        );

        let outcome = adapter
            .handle_webhook(WebhookDelivery::new(HashMap::new(), body.into_bytes()))
            .await
            .unwrap();

        assert_eq!(outcome.status, GatewayStatus::Success);
        assert_eq!(outcome.reference, Some(reference));
        assert_eq!(outcome.gateway_reference, Some("4iUThBRRWXMg".to_string()));
    }

    #[tokio::test]
    async fn callback_without_response_code_is_rejected() {
        let adapter = MpesaTanzaniaAdapter::new(MpesaTanzaniaConfig::new("api-key", "000000"));

        let err = adapter
            .handle_webhook(WebhookDelivery::new(
                HashMap::new(),
                br#"{"something":"else"}"#.to_vec(),
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::InvalidWebhook { .. }));
    }
}

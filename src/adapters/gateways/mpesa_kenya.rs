//! M-Pesa Kenya gateway driver (Safaricom Daraja).
//!
//! Collections run as STK pushes: the API prompts the customer's handset
//! for their M-PESA PIN, and settlement arrives through an unsigned result
//! callback correlated by `CheckoutRequestID`. Amounts are whole shillings,
//! rounded up so the merchant is never undercharged.
//!
//! Refunds are approximated as B2C payouts and require separately
//! provisioned disbursement credentials.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, FixedOffset, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::foundation::CurrencyCode;
use crate::domain::payment::{GatewayId, PaymentReference};
use crate::ports::{
    GatewayDriver, GatewayError, GatewayStatus, InitiateOutcome, InitiateRequest, NextAction,
    RefundOutcome, RefundRequest, VerifyOutcome, VerifyRequest, WebhookDelivery, WebhookOutcome,
};

use super::token_cache::{BearerTokenCache, FetchedToken};
use super::transport_error;

/// Daraja reports "transaction still processing" as an HTTP error carrying
/// this code.
const STILL_PROCESSING_CODE: &str = "500.001.1001";

/// B2C credentials that unlock refund-by-payout.
#[derive(Clone)]
pub struct MpesaDisbursementConfig {
    initiator_name: String,
    security_credential: SecretString,
    result_url: String,
}

impl MpesaDisbursementConfig {
    pub fn new(
        initiator_name: impl Into<String>,
        security_credential: impl Into<String>,
        result_url: impl Into<String>,
    ) -> Self {
        Self {
            initiator_name: initiator_name.into(),
            security_credential: SecretString::new(security_credential.into()),
            result_url: result_url.into(),
        }
    }
}

/// Daraja API configuration.
#[derive(Clone)]
pub struct MpesaKenyaConfig {
    consumer_key: SecretString,
    consumer_secret: SecretString,

    /// Paybill or till number collecting the funds.
    shortcode: String,

    /// Lipa na M-Pesa online passkey, issued per shortcode.
    passkey: SecretString,

    api_base_url: String,

    /// Present only when the operator has provisioned B2C credentials.
    disbursement: Option<MpesaDisbursementConfig>,
}

impl MpesaKenyaConfig {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        shortcode: impl Into<String>,
        passkey: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: SecretString::new(consumer_key.into()),
            consumer_secret: SecretString::new(consumer_secret.into()),
            shortcode: shortcode.into(),
            passkey: SecretString::new(passkey.into()),
            api_base_url: "https://api.safaricom.co.ke".to_string(),
            disbursement: None,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads:
    /// - `MPESA_KE_CONSUMER_KEY`
    /// - `MPESA_KE_CONSUMER_SECRET`
    /// - `MPESA_KE_SHORTCODE`
    /// - `MPESA_KE_PASSKEY`
    /// - `MPESA_KE_INITIATOR_NAME`, `MPESA_KE_SECURITY_CREDENTIAL`,
    ///   `MPESA_KE_RESULT_URL` (optional, all three enable refunds)
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let mut config = Self::new(
            std::env::var("MPESA_KE_CONSUMER_KEY")?,
            std::env::var("MPESA_KE_CONSUMER_SECRET")?,
            std::env::var("MPESA_KE_SHORTCODE")?,
            std::env::var("MPESA_KE_PASSKEY")?,
        );

        if let (Ok(initiator), Ok(credential), Ok(result_url)) = (
            std::env::var("MPESA_KE_INITIATOR_NAME"),
            std::env::var("MPESA_KE_SECURITY_CREDENTIAL"),
            std::env::var("MPESA_KE_RESULT_URL"),
        ) {
            config = config.with_disbursement(MpesaDisbursementConfig::new(
                initiator, credential, result_url,
            ));
        }

        Ok(config)
    }

    /// Set a custom API base URL (for testing, or the sandbox).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Attach B2C credentials, enabling refunds.
    pub fn with_disbursement(mut self, disbursement: MpesaDisbursementConfig) -> Self {
        self.disbursement = Some(disbursement);
        self
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Daraja returns the lifetime as a string, e.g. `"3599"`.
    expires_in: String,
}

/// M-Pesa Kenya gateway driver.
pub struct MpesaKenyaAdapter {
    config: MpesaKenyaConfig,
    http_client: reqwest::Client,
    token_cache: BearerTokenCache,
}

impl MpesaKenyaAdapter {
    pub fn new(config: MpesaKenyaConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            token_cache: BearerTokenCache::new(),
        }
    }

    /// Normalize a customer phone number to the `2547XXXXXXXX` form Daraja
    /// requires. Accepts `07...`, `+254...`, and bare nine-digit subscriber
    /// numbers.
    fn normalize_msisdn(raw: &str) -> Option<String> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

        let msisdn = if digits.starts_with("254") {
            digits
        } else if let Some(rest) = digits.strip_prefix('0') {
            format!("254{}", rest)
        } else if digits.len() == 9 {
            format!("254{}", digits)
        } else {
            digits
        };

        let valid = msisdn.len() == 12 && msisdn.starts_with("254");
        valid.then_some(msisdn)
    }

    /// Daraja timestamps are East Africa Time formatted `YYYYMMDDHHMMSS`.
    fn daraja_timestamp(now: DateTime<Utc>) -> String {
        let eat = FixedOffset::east_opt(3 * 3600).expect("EAT is a valid offset");
        now.with_timezone(&eat).format("%Y%m%d%H%M%S").to_string()
    }

    /// STK password: `base64(shortcode + passkey + timestamp)`.
    fn stk_password(&self, timestamp: &str) -> String {
        STANDARD.encode(format!(
            "{}{}{}",
            self.config.shortcode,
            self.config.passkey.expose_secret(),
            timestamp
        ))
    }

    /// Daraja caps `AccountReference` at 12 characters.
    fn account_reference(reference: &PaymentReference) -> String {
        reference.as_str().chars().take(12).collect()
    }

    /// `ResultCode` arrives as a JSON number in callbacks and as a string in
    /// query responses.
    fn result_code_of(value: &serde_json::Value) -> Option<String> {
        match value {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn parse_result_code(code: &str) -> GatewayStatus {
        match code {
            "0" => GatewayStatus::Success,
            "" => GatewayStatus::Unknown,
            _ => GatewayStatus::Failed,
        }
    }

    async fn fetch_token(&self) -> Result<FetchedToken, GatewayError> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.api_base_url
        );

        let response = self
            .http_client
            .get(&url)
            .basic_auth(
                self.config.consumer_key.expose_secret(),
                Some(self.config.consumer_secret.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::MpesaKenya, e))?;

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "Daraja token request rejected");
            return Err(GatewayError::authentication(
                GatewayId::MpesaKenya,
                "consumer credentials rejected",
            ));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::MpesaKenya,
                format!("unexpected token payload: {}", e),
            )
        })?;

        Ok(FetchedToken {
            expires_in_secs: token.expires_in.parse().unwrap_or(3600),
            token: SecretString::new(token.access_token),
        })
    }

    async fn bearer(&self) -> Result<SecretString, GatewayError> {
        self.token_cache.get(|| self.fetch_token()).await
    }

    async fn read_body(
        &self,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, GatewayError> {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            // The cached token was rejected; the next call fetches fresh.
            self.token_cache.invalidate().await;
            return Err(GatewayError::authentication(
                GatewayId::MpesaKenya,
                "access token rejected",
            ));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::MpesaKenya,
                format!("response body is not JSON: {}", e),
            )
        })?;

        if !status.is_success() {
            let code = body["errorCode"].as_str().unwrap_or_default().to_string();
            let message = body["errorMessage"]
                .as_str()
                .unwrap_or("request rejected")
                .to_string();
            tracing::warn!(
                http_status = %status,
                error_code = %code,
                message = %message,
                "Daraja request failed"
            );
            return Err(GatewayError::declined(
                GatewayId::MpesaKenya,
                Some(code).filter(|c| !c.is_empty()),
                message,
            ));
        }

        Ok(body)
    }
}

#[async_trait]
impl GatewayDriver for MpesaKenyaAdapter {
    fn id(&self) -> GatewayId {
        GatewayId::MpesaKenya
    }

    fn supported_countries(&self) -> &'static [&'static str] {
        &["KE"]
    }

    fn supported_currencies(&self) -> &'static [CurrencyCode] {
        &[CurrencyCode::KES]
    }

    fn supports_refunds(&self) -> bool {
        self.config.disbursement.is_some()
    }

    async fn initialize(&self, request: InitiateRequest) -> Result<InitiateOutcome, GatewayError> {
        self.check_minimum(&request.amount)?;

        let phone = request
            .customer_phone
            .as_deref()
            .and_then(Self::normalize_msisdn)
            .ok_or_else(|| {
                GatewayError::invalid_request(
                    GatewayId::MpesaKenya,
                    "a valid Kenyan phone number is required for an STK push",
                )
            })?;

        let token = self.bearer().await?;
        let timestamp = Self::daraja_timestamp(Utc::now());

        let body = serde_json::json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": self.stk_password(&timestamp),
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": request.amount.major_units_ceil(),
            "PartyA": phone,
            "PartyB": self.config.shortcode,
            "PhoneNumber": phone,
            "CallBackURL": request.callback_url,
            "AccountReference": Self::account_reference(&request.reference),
            "TransactionDesc": format!("Order {}", request.order_id),
        });

        let url = format!(
            "{}/mpesa/stkpush/v1/processrequest",
            self.config.api_base_url
        );
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::MpesaKenya, e))?;

        let raw = self.read_body(response).await?;

        let response_code = raw["ResponseCode"].as_str().unwrap_or_default();
        if response_code != "0" {
            let description = raw["ResponseDescription"]
                .as_str()
                .unwrap_or("STK push rejected")
                .to_string();
            return Err(GatewayError::declined(
                GatewayId::MpesaKenya,
                Some(response_code.to_string()),
                description,
            ));
        }

        let checkout_id = raw["CheckoutRequestID"].as_str().map(String::from);
        let instructions = raw["CustomerMessage"]
            .as_str()
            .unwrap_or("Enter your M-PESA PIN on your phone to complete the payment")
            .to_string();

        tracing::info!(
            checkout_request_id = checkout_id.as_deref().unwrap_or_default(),
            "STK push sent"
        );

        Ok(InitiateOutcome {
            reference: request.reference,
            gateway_reference: checkout_id,
            next_action: NextAction::CustomerPrompt { instructions },
            raw,
        })
    }

    async fn verify(&self, request: VerifyRequest) -> Result<VerifyOutcome, GatewayError> {
        let checkout_id = request.gateway_reference.clone().ok_or_else(|| {
            GatewayError::invalid_request(
                GatewayId::MpesaKenya,
                "verification requires the CheckoutRequestID from initialization",
            )
        })?;

        let token = self.bearer().await?;
        let timestamp = Self::daraja_timestamp(Utc::now());

        let body = serde_json::json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": self.stk_password(&timestamp),
            "Timestamp": timestamp,
            "CheckoutRequestID": checkout_id,
        });

        let url = format!("{}/mpesa/stkpushquery/v1/query", self.config.api_base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::MpesaKenya, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.token_cache.invalidate().await;
            return Err(GatewayError::authentication(
                GatewayId::MpesaKenya,
                "access token rejected",
            ));
        }

        let raw: serde_json::Value = response.json().await.map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::MpesaKenya,
                format!("response body is not JSON: {}", e),
            )
        })?;

        // A push the customer has not yet answered surfaces as an HTTP
        // error with a dedicated code, not as a result payload.
        if raw["errorCode"].as_str() == Some(STILL_PROCESSING_CODE) {
            return Ok(VerifyOutcome {
                status: GatewayStatus::Pending,
                amount: None,
                gateway_reference: Some(checkout_id),
                message: raw["errorMessage"].as_str().map(String::from),
                raw,
            });
        }

        if !status.is_success() {
            let code = raw["errorCode"].as_str().unwrap_or_default().to_string();
            let message = raw["errorMessage"]
                .as_str()
                .unwrap_or("query rejected")
                .to_string();
            return Err(GatewayError::declined(
                GatewayId::MpesaKenya,
                Some(code).filter(|c| !c.is_empty()),
                message,
            ));
        }

        let result_code = Self::result_code_of(&raw["ResultCode"]).unwrap_or_default();

        Ok(VerifyOutcome {
            status: Self::parse_result_code(&result_code),
            // The query reports no amount; the callback metadata does.
            amount: None,
            gateway_reference: Some(checkout_id),
            message: raw["ResultDesc"].as_str().map(String::from),
            raw,
        })
    }

    async fn handle_webhook(
        &self,
        delivery: WebhookDelivery,
    ) -> Result<WebhookOutcome, GatewayError> {
        let raw = delivery.json().map_err(|e| {
            GatewayError::invalid_webhook(GatewayId::MpesaKenya, format!("body is not JSON: {}", e))
        })?;

        let callback = &raw["Body"]["stkCallback"];
        if callback.is_null() {
            return Err(GatewayError::invalid_webhook(
                GatewayId::MpesaKenya,
                "missing Body.stkCallback",
            ));
        }

        let checkout_id = callback["CheckoutRequestID"]
            .as_str()
            .map(String::from)
            .filter(|s| !s.is_empty());
        let result_code = Self::result_code_of(&callback["ResultCode"]).unwrap_or_default();
        let status = Self::parse_result_code(&result_code);

        // Daraja callbacks are unsigned; log enough to audit the source and
        // rely on verification-by-query before money moves.
        tracing::info!(
            checkout_request_id = checkout_id.as_deref().unwrap_or_default(),
            result_code = %result_code,
            "M-Pesa callback received"
        );

        Ok(WebhookOutcome {
            // The callback carries no platform reference; correlation runs
            // on the CheckoutRequestID.
            reference: None,
            gateway_reference: checkout_id,
            status,
            raw,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundOutcome, GatewayError> {
        let disbursement = self.config.disbursement.as_ref().ok_or_else(|| {
            GatewayError::RefundsUnsupported {
                gateway: GatewayId::MpesaKenya,
                message: "B2C credentials are not configured".to_string(),
            }
        })?;

        let phone = request
            .customer_phone
            .as_deref()
            .and_then(Self::normalize_msisdn)
            .ok_or_else(|| {
                GatewayError::invalid_request(
                    GatewayId::MpesaKenya,
                    "the customer's phone number is required to return funds",
                )
            })?;

        let amount = request.amount.as_ref().ok_or_else(|| {
            GatewayError::invalid_request(
                GatewayId::MpesaKenya,
                "an explicit amount is required for a B2C refund",
            )
        })?;

        let token = self.bearer().await?;

        let body = serde_json::json!({
            "InitiatorName": disbursement.initiator_name,
            "SecurityCredential": disbursement.security_credential.expose_secret(),
            "CommandID": "BusinessPayment",
            "Amount": amount.major_units_ceil(),
            "PartyA": self.config.shortcode,
            "PartyB": phone,
            "Remarks": request.reason.as_deref().unwrap_or("Refund"),
            "QueueTimeOutURL": disbursement.result_url,
            "ResultURL": disbursement.result_url,
            "Occasion": request.reference.as_str(),
        });

        let url = format!("{}/mpesa/b2c/v1/paymentrequest", self.config.api_base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::MpesaKenya, e))?;

        let raw = self.read_body(response).await?;

        let response_code = raw["ResponseCode"].as_str().unwrap_or_default();
        if response_code != "0" {
            let description = raw["ResponseDescription"]
                .as_str()
                .unwrap_or("B2C request rejected")
                .to_string();
            return Err(GatewayError::declined(
                GatewayId::MpesaKenya,
                Some(response_code.to_string()),
                description,
            ));
        }

        tracing::info!(reference = %request.reference, "B2C refund payout queued");

        Ok(RefundOutcome {
            // B2C settles through its async result callback.
            status: GatewayStatus::Pending,
            refund_reference: raw["ConversationID"].as_str().map(String::from),
            via_disbursement: true,
            raw,
        })
    }
}

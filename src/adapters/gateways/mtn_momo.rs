//! MTN Mobile Money gateway driver.
//!
//! Collections run through the `requesttopay` flow: we mint a UUID
//! `X-Reference-Id`, MTN prompts the customer, and the provider answers 202
//! with an empty body. Settlement state comes from polling the resource or
//! from the unsigned PUT callback. Amounts cross the wire as decimal
//! strings in major units.
//!
//! Refunds are approximated as disbursement transfers and require the
//! separately provisioned disbursement product credentials.

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::foundation::{CurrencyCode, Money};
use crate::domain::payment::{GatewayId, PaymentReference};
use crate::ports::{
    GatewayDriver, GatewayError, GatewayStatus, InitiateOutcome, InitiateRequest, NextAction,
    RefundOutcome, RefundRequest, VerifyOutcome, VerifyRequest, WebhookDelivery, WebhookOutcome,
};

use super::token_cache::{BearerTokenCache, FetchedToken};
use super::transport_error;

/// Credentials for one MTN API product (collection or disbursement).
#[derive(Clone)]
pub struct MtnProductConfig {
    subscription_key: SecretString,
    api_user: String,
    api_key: SecretString,
}

impl MtnProductConfig {
    pub fn new(
        subscription_key: impl Into<String>,
        api_user: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            subscription_key: SecretString::new(subscription_key.into()),
            api_user: api_user.into(),
            api_key: SecretString::new(api_key.into()),
        }
    }
}

/// MTN MoMo API configuration.
#[derive(Clone)]
pub struct MtnMomoConfig {
    collection: MtnProductConfig,

    /// Present only when the operator has provisioned the disbursement
    /// product; unlocks refunds.
    disbursement: Option<MtnProductConfig>,

    /// `X-Target-Environment` header value, e.g. `mtnuganda`.
    target_environment: String,

    /// Dialing prefix of the market this deployment serves, e.g. `256`.
    msisdn_prefix: String,

    api_base_url: String,
}

impl MtnMomoConfig {
    pub fn new(
        collection: MtnProductConfig,
        target_environment: impl Into<String>,
        msisdn_prefix: impl Into<String>,
    ) -> Self {
        Self {
            collection,
            disbursement: None,
            target_environment: target_environment.into(),
            msisdn_prefix: msisdn_prefix.into(),
            api_base_url: "https://proxy.momoapi.mtn.com".to_string(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads:
    /// - `MTN_MOMO_SUBSCRIPTION_KEY`, `MTN_MOMO_API_USER`, `MTN_MOMO_API_KEY`
    /// - `MTN_MOMO_TARGET_ENVIRONMENT`
    /// - `MTN_MOMO_MSISDN_PREFIX`
    /// - `MTN_MOMO_DISBURSEMENT_SUBSCRIPTION_KEY`,
    ///   `MTN_MOMO_DISBURSEMENT_API_USER`, `MTN_MOMO_DISBURSEMENT_API_KEY`
    ///   (optional, all three enable refunds)
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let collection = MtnProductConfig::new(
            std::env::var("MTN_MOMO_SUBSCRIPTION_KEY")?,
            std::env::var("MTN_MOMO_API_USER")?,
            std::env::var("MTN_MOMO_API_KEY")?,
        );

        let mut config = Self::new(
            collection,
            std::env::var("MTN_MOMO_TARGET_ENVIRONMENT")?,
            std::env::var("MTN_MOMO_MSISDN_PREFIX")?,
        );

        if let (Ok(subscription_key), Ok(api_user), Ok(api_key)) = (
            std::env::var("MTN_MOMO_DISBURSEMENT_SUBSCRIPTION_KEY"),
            std::env::var("MTN_MOMO_DISBURSEMENT_API_USER"),
            std::env::var("MTN_MOMO_DISBURSEMENT_API_KEY"),
        ) {
            config = config.with_disbursement(MtnProductConfig::new(
                subscription_key,
                api_user,
                api_key,
            ));
        }

        Ok(config)
    }

    /// Set a custom API base URL (for testing, or the sandbox).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Attach disbursement credentials, enabling refunds.
    pub fn with_disbursement(mut self, disbursement: MtnProductConfig) -> Self {
        self.disbursement = Some(disbursement);
        self
    }
}

fn default_token_lifetime() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_lifetime")]
    expires_in: u64,
}

/// MTN MoMo gateway driver.
pub struct MtnMomoAdapter {
    config: MtnMomoConfig,
    http_client: reqwest::Client,
    collection_token: BearerTokenCache,
    disbursement_token: BearerTokenCache,
}

impl MtnMomoAdapter {
    pub fn new(config: MtnMomoConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            collection_token: BearerTokenCache::new(),
            disbursement_token: BearerTokenCache::new(),
        }
    }

    /// Normalize a customer phone number to the bare MSISDN form MTN
    /// requires: market prefix plus nine subscriber digits, no plus sign.
    fn normalize_msisdn(&self, raw: &str) -> Option<String> {
        let prefix = self.config.msisdn_prefix.as_str();
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

        let msisdn = if digits.starts_with(prefix) {
            digits
        } else if let Some(rest) = digits.strip_prefix('0') {
            format!("{}{}", prefix, rest)
        } else if digits.len() == 9 {
            format!("{}{}", prefix, digits)
        } else {
            digits
        };

        let valid = msisdn.len() == prefix.len() + 9 && msisdn.starts_with(prefix);
        valid.then_some(msisdn)
    }

    fn parse_status(status: &str) -> GatewayStatus {
        match status {
            "SUCCESSFUL" => GatewayStatus::Success,
            "PENDING" => GatewayStatus::Pending,
            "FAILED" => GatewayStatus::Failed,
            _ => GatewayStatus::Unknown,
        }
    }

    /// The `reason` field arrives as a bare string on callbacks and as a
    /// `{code, message}` object on resource reads.
    fn reason_of(value: &serde_json::Value) -> Option<String> {
        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(_) => value["message"].as_str().map(String::from),
            _ => None,
        }
    }

    async fn fetch_token(
        &self,
        product: &str,
        credentials: &MtnProductConfig,
    ) -> Result<FetchedToken, GatewayError> {
        let url = format!("{}/{}/token/", self.config.api_base_url, product);

        let response = self
            .http_client
            .post(&url)
            .basic_auth(
                &credentials.api_user,
                Some(credentials.api_key.expose_secret()),
            )
            .header(
                "Ocp-Apim-Subscription-Key",
                credentials.subscription_key.expose_secret(),
            )
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::MtnMomo, e))?;

        if !response.status().is_success() {
            tracing::error!(
                status = %response.status(),
                product = %product,
                "MTN token request rejected"
            );
            return Err(GatewayError::authentication(
                GatewayId::MtnMomo,
                format!("{} credentials rejected", product),
            ));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::MtnMomo,
                format!("unexpected token payload: {}", e),
            )
        })?;

        Ok(FetchedToken {
            token: SecretString::new(token.access_token),
            expires_in_secs: token.expires_in,
        })
    }

    async fn collection_bearer(&self) -> Result<SecretString, GatewayError> {
        self.collection_token
            .get(|| self.fetch_token("collection", &self.config.collection))
            .await
    }

    /// Convert a non-2xx response into the appropriate error. MTN's 202
    /// acknowledgements have empty bodies, so errors are read as text.
    async fn reject(&self, response: reqwest::Response) -> GatewayError {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Either product's token may have expired; drop both.
            self.collection_token.invalidate().await;
            self.disbursement_token.invalidate().await;
            return GatewayError::authentication(GatewayId::MtnMomo, "access token rejected");
        }

        if status.is_server_error() {
            return GatewayError::network(GatewayId::MtnMomo, format!("MTN returned {}", status));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["message"].as_str().map(String::from))
            .unwrap_or_else(|| {
                if body.is_empty() {
                    format!("MTN returned {}", status)
                } else {
                    body.clone()
                }
            });

        tracing::warn!(http_status = %status, message = %message, "MTN request failed");
        GatewayError::declined(GatewayId::MtnMomo, None, message)
    }
}

#[async_trait]
impl GatewayDriver for MtnMomoAdapter {
    fn id(&self) -> GatewayId {
        GatewayId::MtnMomo
    }

    fn supported_countries(&self) -> &'static [&'static str] {
        &["UG", "RW", "GH", "ZM", "CM"]
    }

    fn supported_currencies(&self) -> &'static [CurrencyCode] {
        &[
            CurrencyCode::UGX,
            CurrencyCode::RWF,
            CurrencyCode::GHS,
            CurrencyCode::ZMW,
            CurrencyCode::XAF,
        ]
    }

    fn supports_refunds(&self) -> bool {
        self.config.disbursement.is_some()
    }

    fn min_amount(&self, currency: CurrencyCode) -> Decimal {
        match currency {
            CurrencyCode::UGX => Decimal::from(1000),
            CurrencyCode::RWF => Decimal::from(500),
            CurrencyCode::XAF => Decimal::from(100),
            _ => Decimal::ONE,
        }
    }

    async fn initialize(&self, request: InitiateRequest) -> Result<InitiateOutcome, GatewayError> {
        self.check_minimum(&request.amount)?;

        let phone = request
            .customer_phone
            .as_deref()
            .and_then(|p| self.normalize_msisdn(p))
            .ok_or_else(|| {
                GatewayError::invalid_request(
                    GatewayId::MtnMomo,
                    "a valid mobile money phone number is required",
                )
            })?;

        let token = self.collection_bearer().await?;
        let reference_id = Uuid::new_v4().to_string();

        let body = serde_json::json!({
            "amount": request.amount.major_units_string(),
            "currency": request.amount.currency().code(),
            "externalId": request.reference.as_str(),
            "payer": {
                "partyIdType": "MSISDN",
                "partyId": phone,
            },
            "payerMessage": format!("Order {}", request.order_id),
            "payeeNote": request.reference.as_str(),
        });

        let url = format!("{}/collection/v1_0/requesttopay", self.config.api_base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .header("X-Reference-Id", &reference_id)
            .header("X-Target-Environment", &self.config.target_environment)
            .header(
                "Ocp-Apim-Subscription-Key",
                self.config.collection.subscription_key.expose_secret(),
            )
            .header("X-Callback-Url", &request.callback_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::MtnMomo, e))?;

        if !response.status().is_success() {
            return Err(self.reject(response).await);
        }

        tracing::info!(reference_id = %reference_id, "MTN requesttopay accepted");

        // The 202 acknowledgement has no body; the reference id is the
        // only provider-side handle.
        Ok(InitiateOutcome {
            reference: request.reference,
            gateway_reference: Some(reference_id.clone()),
            next_action: NextAction::CustomerPrompt {
                instructions: "Approve the payment request on your phone".to_string(),
            },
            raw: serde_json::json!({ "referenceId": reference_id }),
        })
    }

    async fn verify(&self, request: VerifyRequest) -> Result<VerifyOutcome, GatewayError> {
        let reference_id = request.gateway_reference.clone().ok_or_else(|| {
            GatewayError::invalid_request(
                GatewayId::MtnMomo,
                "verification requires the X-Reference-Id from initialization",
            )
        })?;

        let token = self.collection_bearer().await?;

        let url = format!(
            "{}/collection/v1_0/requesttopay/{}",
            self.config.api_base_url, reference_id
        );
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token.expose_secret())
            .header("X-Target-Environment", &self.config.target_environment)
            .header(
                "Ocp-Apim-Subscription-Key",
                self.config.collection.subscription_key.expose_secret(),
            )
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::MtnMomo, e))?;

        if !response.status().is_success() {
            return Err(self.reject(response).await);
        }

        let raw: serde_json::Value = response.json().await.map_err(|e| {
            GatewayError::invalid_response(
                GatewayId::MtnMomo,
                format!("response body is not JSON: {}", e),
            )
        })?;

        let amount = match (
            raw["amount"].as_str().and_then(|a| a.parse::<Decimal>().ok()),
            raw["currency"].as_str().and_then(CurrencyCode::from_code),
        ) {
            (Some(amount), Some(currency)) => Money::new(amount, currency).ok(),
            _ => None,
        };

        Ok(VerifyOutcome {
            status: Self::parse_status(raw["status"].as_str().unwrap_or_default()),
            amount,
            gateway_reference: Some(reference_id),
            message: Self::reason_of(&raw["reason"]),
            raw,
        })
    }

    async fn handle_webhook(
        &self,
        delivery: WebhookDelivery,
    ) -> Result<WebhookOutcome, GatewayError> {
        let raw = delivery.json().map_err(|e| {
            GatewayError::invalid_webhook(GatewayId::MtnMomo, format!("body is not JSON: {}", e))
        })?;

        if raw["status"].is_null() {
            return Err(GatewayError::invalid_webhook(
                GatewayId::MtnMomo,
                "missing status field",
            ));
        }

        let status = Self::parse_status(raw["status"].as_str().unwrap_or_default());
        let reference = raw["externalId"]
            .as_str()
            .and_then(|r| r.parse::<PaymentReference>().ok());
        let gateway_reference = raw["financialTransactionId"]
            .as_str()
            .or_else(|| raw["referenceId"].as_str())
            .map(String::from);

        // MTN callbacks are unsigned; log for audit and rely on
        // verification-by-query before money moves.
        tracing::info!(
            status = %status,
            external_id = raw["externalId"].as_str().unwrap_or_default(),
            "MTN callback received"
        );

        Ok(WebhookOutcome {
            reference,
            gateway_reference,
            status,
            raw,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundOutcome, GatewayError> {
        let disbursement = self.config.disbursement.as_ref().ok_or_else(|| {
            GatewayError::RefundsUnsupported {
                gateway: GatewayId::MtnMomo,
                message: "disbursement credentials are not configured".to_string(),
            }
        })?;

        let phone = request
            .customer_phone
            .as_deref()
            .and_then(|p| self.normalize_msisdn(p))
            .ok_or_else(|| {
                GatewayError::invalid_request(
                    GatewayId::MtnMomo,
                    "the customer's phone number is required to return funds",
                )
            })?;

        let amount = request.amount.as_ref().ok_or_else(|| {
            GatewayError::invalid_request(
                GatewayId::MtnMomo,
                "an explicit amount is required for a disbursement refund",
            )
        })?;

        let token = self
            .disbursement_token
            .get(|| self.fetch_token("disbursement", disbursement))
            .await?;
        let transfer_id = Uuid::new_v4().to_string();

        let body = serde_json::json!({
            "amount": amount.major_units_string(),
            "currency": amount.currency().code(),
            "externalId": request.reference.as_str(),
            "payee": {
                "partyIdType": "MSISDN",
                "partyId": phone,
            },
            "payerMessage": request.reason.as_deref().unwrap_or("Refund"),
            "payeeNote": "Refund",
        });

        let url = format!("{}/disbursement/v1_0/transfer", self.config.api_base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .header("X-Reference-Id", &transfer_id)
            .header("X-Target-Environment", &self.config.target_environment)
            .header(
                "Ocp-Apim-Subscription-Key",
                disbursement.subscription_key.expose_secret(),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(GatewayId::MtnMomo, e))?;

        if !response.status().is_success() {
            return Err(self.reject(response).await);
        }

        tracing::info!(transfer_id = %transfer_id, reference = %request.reference, "MTN refund transfer queued");

        Ok(RefundOutcome {
            // Transfers settle asynchronously; poll the transfer resource.
            status: GatewayStatus::Pending,
            refund_reference: Some(transfer_id.clone()),
            via_disbursement: true,
            raw: serde_json::json!({ "referenceId": transfer_id }),
        })
    }
}

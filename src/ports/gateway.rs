//! Gateway driver port for payment provider integrations.
//!
//! Defines the contract every gateway driver implements. Driver
//! implementations own all provider-specific knowledge: wire formats,
//! authentication, amount units, phone normalization, and the mapping from
//! provider status codes to the canonical [`GatewayStatus`].
//!
//! # Design
//!
//! - **Protocol normalization**: callers never see provider payloads except
//!   as opaque `raw` values kept for reconciliation
//! - **No network before validation**: below-minimum amounts are rejected
//!   locally
//! - **Total status mapping**: unrecognized provider codes normalize to
//!   `Unknown`, never to an error

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{CountryCode, CurrencyCode, Money, OrderId, TenantId};
use crate::domain::payment::{GatewayId, PaymentReference};

/// Port for payment gateway integrations.
///
/// One driver per provider. All methods that talk to the network return
/// [`GatewayError`] on failure; callers decide whether to surface or absorb.
#[async_trait]
pub trait GatewayDriver: Send + Sync {
    /// Which gateway this driver speaks to.
    fn id(&self) -> GatewayId;

    /// Human-readable name shown to merchants.
    fn display_name(&self) -> &'static str {
        self.id().display_name()
    }

    /// ISO 3166-1 alpha-2 codes of countries this gateway serves.
    fn supported_countries(&self) -> &'static [&'static str];

    /// Currencies this gateway settles in.
    fn supported_currencies(&self) -> &'static [CurrencyCode];

    /// True when the gateway can collect for this country and currency.
    fn is_available(&self, country: &CountryCode, currency: CurrencyCode) -> bool {
        self.supported_countries().contains(&country.as_str())
            && self.supported_currencies().contains(&currency)
    }

    /// True when this driver can return funds to the customer.
    fn supports_refunds(&self) -> bool;

    /// Smallest chargeable amount in major units for the currency.
    fn min_amount(&self, _currency: CurrencyCode) -> Decimal {
        Decimal::ONE
    }

    /// Rejects amounts below the gateway minimum before any network call.
    fn check_minimum(&self, amount: &Money) -> Result<(), GatewayError> {
        let minimum = self.min_amount(amount.currency());
        if amount.amount() < minimum {
            return Err(GatewayError::BelowMinimum {
                amount: amount.amount(),
                minimum,
                currency: amount.currency(),
            });
        }
        Ok(())
    }

    /// Starts a collection: charge authorization, STK push, or payment link.
    async fn initialize(&self, request: InitiateRequest) -> Result<InitiateOutcome, GatewayError>;

    /// Queries the gateway for the current state of a payment.
    async fn verify(&self, request: VerifyRequest) -> Result<VerifyOutcome, GatewayError>;

    /// Authenticates and normalizes an inbound webhook delivery.
    async fn handle_webhook(
        &self,
        delivery: WebhookDelivery,
    ) -> Result<WebhookOutcome, GatewayError>;

    /// Returns funds for a completed payment.
    async fn refund(&self, request: RefundRequest) -> Result<RefundOutcome, GatewayError>;
}

/// Canonical payment state as reported by a gateway.
///
/// Every driver owns a total mapping from its provider's codes onto these
/// four values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    /// Funds confirmed.
    Success,

    /// Customer prompt outstanding or settlement still running.
    Pending,

    /// Definitive failure.
    Failed,

    /// Provider code not recognized. Treated as "check again later".
    Unknown,
}

impl GatewayStatus {
    /// True only for confirmed funds.
    pub fn is_success(&self) -> bool {
        matches!(self, GatewayStatus::Success)
    }
}

impl std::fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayStatus::Success => "success",
            GatewayStatus::Pending => "pending",
            GatewayStatus::Failed => "failed",
            GatewayStatus::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Request to start a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateRequest {
    /// Owning tenant, attached to provider metadata.
    pub tenant_id: TenantId,

    /// Order being paid for.
    pub order_id: OrderId,

    /// Platform reference, already persisted with the pending payment.
    pub reference: PaymentReference,

    /// Amount to collect.
    pub amount: Money,

    /// Customer email. Required by card gateways.
    pub customer_email: Option<String>,

    /// Customer phone, in whatever form the customer entered it.
    /// Drivers normalize to their own MSISDN rules.
    pub customer_phone: Option<String>,

    /// Where the provider should send the customer or its callback.
    pub callback_url: String,

    /// Free-form metadata passed through to the provider where supported.
    pub metadata: HashMap<String, String>,
}

/// What the caller must do next to complete the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextAction {
    /// Send the customer to the provider's hosted page.
    RedirectTo { authorization_url: String },

    /// The provider is prompting the customer directly (STK push, USSD).
    CustomerPrompt { instructions: String },
}

/// Successful initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateOutcome {
    /// Platform reference, echoed back.
    pub reference: PaymentReference,

    /// Provider-side reference, when assigned at initialization.
    pub gateway_reference: Option<String>,

    /// How the customer completes the payment.
    pub next_action: NextAction,

    /// Raw provider response, kept for reconciliation.
    pub raw: serde_json::Value,
}

/// Request to check the state of a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// Platform reference.
    pub reference: PaymentReference,

    /// Provider-side reference, when one was assigned. Drivers whose query
    /// API is keyed by their own id use this and ignore the platform
    /// reference.
    pub gateway_reference: Option<String>,
}

/// Result of a verification query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    /// Normalized state.
    pub status: GatewayStatus,

    /// Amount the provider says it collected, when reported.
    pub amount: Option<Money>,

    /// Provider-side reference, when reported.
    pub gateway_reference: Option<String>,

    /// Provider's human-readable detail, when present.
    pub message: Option<String>,

    /// Raw provider response, kept for reconciliation.
    pub raw: serde_json::Value,
}

/// An inbound webhook exactly as received.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl WebhookDelivery {
    /// Wraps raw headers and body. Header names are matched
    /// case-insensitively.
    pub fn new(headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self { headers, body }
    }

    /// Looks up a header by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The raw body bytes, as signed by the provider.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Normalized webhook content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookOutcome {
    /// Platform reference extracted from the payload, when present.
    pub reference: Option<PaymentReference>,

    /// Provider-side reference extracted from the payload, when present.
    pub gateway_reference: Option<String>,

    /// Normalized state carried by the event.
    pub status: GatewayStatus,

    /// Raw payload, kept for reconciliation.
    pub raw: serde_json::Value,
}

/// Request to return funds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Platform reference of the completed payment.
    pub reference: PaymentReference,

    /// Provider-side reference of the completed payment.
    pub gateway_reference: Option<String>,

    /// Amount to return. `None` refunds the full captured amount.
    pub amount: Option<Money>,

    /// Customer phone as captured at collection, needed by drivers that
    /// refund via disbursement.
    pub customer_phone: Option<String>,

    /// Operator-supplied reason, passed through where supported.
    pub reason: Option<String>,
}

/// Result of a refund attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundOutcome {
    /// Normalized state of the refund. Providers that process refunds
    /// asynchronously report `Pending` here.
    pub status: GatewayStatus,

    /// Provider's reference for the refund transaction.
    pub refund_reference: Option<String>,

    /// True when the refund was executed as a reverse payout rather than a
    /// true reversal, so operators can reconcile fees separately.
    pub via_disbursement: bool,

    /// Raw provider response, kept for reconciliation.
    pub raw: serde_json::Value,
}

/// Errors from gateway driver operations.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Amount {amount} {currency} is below the gateway minimum of {minimum}")]
    BelowMinimum {
        amount: Decimal,
        minimum: Decimal,
        currency: CurrencyCode,
    },

    #[error("{gateway} does not settle in {currency}")]
    UnsupportedCurrency {
        gateway: GatewayId,
        currency: CurrencyCode,
    },

    #[error("Authentication with {gateway} failed: {message}")]
    Authentication { gateway: GatewayId, message: String },

    #[error("Network error calling {gateway}: {message}")]
    Network { gateway: GatewayId, message: String },

    #[error("Timed out calling {gateway}")]
    Timeout { gateway: GatewayId },

    #[error("{gateway} returned an unusable response: {message}")]
    InvalidResponse { gateway: GatewayId, message: String },

    #[error("Request rejected before reaching {gateway}: {message}")]
    InvalidRequest { gateway: GatewayId, message: String },

    #[error("{gateway} declined the request: {message}")]
    Declined {
        gateway: GatewayId,
        provider_code: Option<String>,
        message: String,
    },

    #[error("Webhook rejected for {gateway}: {message}")]
    InvalidWebhook { gateway: GatewayId, message: String },

    #[error("{gateway} cannot refund this payment: {message}")]
    RefundsUnsupported { gateway: GatewayId, message: String },

    #[error("{gateway} is misconfigured: {message}")]
    Configuration { gateway: GatewayId, message: String },
}

impl GatewayError {
    /// Create a network error.
    pub fn network(gateway: GatewayId, message: impl Into<String>) -> Self {
        GatewayError::Network {
            gateway,
            message: message.into(),
        }
    }

    /// Create an authentication error.
    pub fn authentication(gateway: GatewayId, message: impl Into<String>) -> Self {
        GatewayError::Authentication {
            gateway,
            message: message.into(),
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(gateway: GatewayId, message: impl Into<String>) -> Self {
        GatewayError::InvalidResponse {
            gateway,
            message: message.into(),
        }
    }

    /// Create an error for a request a driver rejects locally, such as a
    /// phone number that cannot be normalized.
    pub fn invalid_request(gateway: GatewayId, message: impl Into<String>) -> Self {
        GatewayError::InvalidRequest {
            gateway,
            message: message.into(),
        }
    }

    /// Create a declined error with the provider's own code.
    pub fn declined(
        gateway: GatewayId,
        provider_code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        GatewayError::Declined {
            gateway,
            provider_code,
            message: message.into(),
        }
    }

    /// Create an invalid webhook error.
    pub fn invalid_webhook(gateway: GatewayId, message: impl Into<String>) -> Self {
        GatewayError::InvalidWebhook {
            gateway,
            message: message.into(),
        }
    }

    /// True when retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Network { .. } | GatewayError::Timeout { .. })
    }

    /// The gateway that raised the error, when attributable.
    pub fn gateway(&self) -> Option<GatewayId> {
        match self {
            GatewayError::BelowMinimum { .. } => None,
            GatewayError::UnsupportedCurrency { gateway, .. }
            | GatewayError::Authentication { gateway, .. }
            | GatewayError::Network { gateway, .. }
            | GatewayError::Timeout { gateway }
            | GatewayError::InvalidResponse { gateway, .. }
            | GatewayError::InvalidRequest { gateway, .. }
            | GatewayError::Declined { gateway, .. }
            | GatewayError::InvalidWebhook { gateway, .. }
            | GatewayError::RefundsUnsupported { gateway, .. }
            | GatewayError::Configuration { gateway, .. } => Some(*gateway),
        }
    }
}

//! Payment gateway configuration
//!
//! One section per gateway, each with an `enabled` switch and the
//! credentials that driver needs. Credentials are optional at the type
//! level so a disabled gateway needs no environment at all; `validate`
//! turns "enabled but incomplete" into a startup error, never a
//! request-time one.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::foundation::CurrencyCode;
use crate::domain::payment::GatewayId;

use super::error::ValidationError;

/// Configuration for all six payment gateways
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewaysConfig {
    #[serde(default)]
    pub paystack: PaystackSettings,

    #[serde(default)]
    pub flutterwave: FlutterwaveSettings,

    #[serde(default)]
    pub mpesa_kenya: MpesaKenyaSettings,

    #[serde(default)]
    pub mpesa_tanzania: MpesaTanzaniaSettings,

    #[serde(default)]
    pub mtn_momo: MtnMomoSettings,

    #[serde(default)]
    pub airtel_money: AirtelMoneySettings,
}

impl GatewaysConfig {
    /// Gateways switched on in this deployment.
    pub fn enabled_gateways(&self) -> Vec<GatewayId> {
        let mut enabled = Vec::new();
        if self.paystack.enabled {
            enabled.push(GatewayId::Paystack);
        }
        if self.flutterwave.enabled {
            enabled.push(GatewayId::Flutterwave);
        }
        if self.mpesa_kenya.enabled {
            enabled.push(GatewayId::MpesaKenya);
        }
        if self.mpesa_tanzania.enabled {
            enabled.push(GatewayId::MpesaTanzania);
        }
        if self.mtn_momo.enabled {
            enabled.push(GatewayId::MtnMomo);
        }
        if self.airtel_money.enabled {
            enabled.push(GatewayId::AirtelMoney);
        }
        enabled
    }

    /// Validate gateway configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.paystack.validate()?;
        self.flutterwave.validate()?;
        self.mpesa_kenya.validate()?;
        self.mpesa_tanzania.validate()?;
        self.mtn_momo.validate()?;
        self.airtel_money.validate()?;
        Ok(())
    }
}

fn require(
    enabled: bool,
    value: &Option<SecretString>,
    name: &'static str,
) -> Result<(), ValidationError> {
    let missing = value
        .as_ref()
        .map(|v| v.expose_secret().is_empty())
        .unwrap_or(true);
    if enabled && missing {
        return Err(ValidationError::MissingRequired(name));
    }
    Ok(())
}

fn require_plain(
    enabled: bool,
    value: &Option<String>,
    name: &'static str,
) -> Result<(), ValidationError> {
    if enabled && value.as_deref().map(str::is_empty).unwrap_or(true) {
        return Err(ValidationError::MissingRequired(name));
    }
    Ok(())
}

/// Paystack settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaystackSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Secret key, also the webhook HMAC key
    pub secret_key: Option<SecretString>,
}

impl PaystackSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(self.enabled, &self.secret_key, "PAYSTACK_SECRET_KEY")
    }
}

/// Flutterwave settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlutterwaveSettings {
    #[serde(default)]
    pub enabled: bool,

    pub secret_key: Option<SecretString>,

    /// Value Flutterwave echoes in the `verif-hash` webhook header
    pub webhook_hash: Option<SecretString>,
}

impl FlutterwaveSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(self.enabled, &self.secret_key, "FLUTTERWAVE_SECRET_KEY")?;
        require(self.enabled, &self.webhook_hash, "FLUTTERWAVE_WEBHOOK_HASH")
    }
}

/// M-Pesa Kenya (Daraja) settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MpesaKenyaSettings {
    #[serde(default)]
    pub enabled: bool,

    pub consumer_key: Option<SecretString>,
    pub consumer_secret: Option<SecretString>,
    pub shortcode: Option<String>,
    pub passkey: Option<SecretString>,

    /// B2C initiator, required only for refunds
    pub initiator_name: Option<String>,
    pub security_credential: Option<SecretString>,
    pub result_url: Option<String>,
}

impl MpesaKenyaSettings {
    /// True when the optional B2C credential trio is fully present.
    pub fn has_disbursement(&self) -> bool {
        self.initiator_name.is_some()
            && self.security_credential.is_some()
            && self.result_url.is_some()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require(self.enabled, &self.consumer_key, "MPESA_KE_CONSUMER_KEY")?;
        require(self.enabled, &self.consumer_secret, "MPESA_KE_CONSUMER_SECRET")?;
        require_plain(self.enabled, &self.shortcode, "MPESA_KE_SHORTCODE")?;
        require(self.enabled, &self.passkey, "MPESA_KE_PASSKEY")?;

        // A partial B2C trio is a misconfiguration, not a disabled feature.
        let trio = [
            self.initiator_name.is_some(),
            self.security_credential.is_some(),
            self.result_url.is_some(),
        ];
        if self.enabled && trio.iter().any(|p| *p) && !trio.iter().all(|p| *p) {
            return Err(ValidationError::MissingRequired(
                "MPESA_KE_INITIATOR_NAME, MPESA_KE_SECURITY_CREDENTIAL and MPESA_KE_RESULT_URL must be set together",
            ));
        }
        Ok(())
    }
}

/// M-Pesa Tanzania (Vodacom OpenAPI) settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MpesaTanzaniaSettings {
    #[serde(default)]
    pub enabled: bool,

    pub api_key: Option<SecretString>,
    pub service_provider_code: Option<String>,
}

impl MpesaTanzaniaSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(self.enabled, &self.api_key, "MPESA_TZ_API_KEY")?;
        require_plain(
            self.enabled,
            &self.service_provider_code,
            "MPESA_TZ_SERVICE_PROVIDER_CODE",
        )
    }
}

/// MTN MoMo settings
#[derive(Debug, Clone, Deserialize)]
pub struct MtnMomoSettings {
    #[serde(default)]
    pub enabled: bool,

    pub subscription_key: Option<SecretString>,
    pub api_user: Option<String>,
    pub api_key: Option<SecretString>,

    #[serde(default = "default_mtn_environment")]
    pub target_environment: String,

    /// Dialing prefix of the market, e.g. `256` for Uganda
    #[serde(default = "default_mtn_prefix")]
    pub msisdn_prefix: String,

    /// Disbursement product credentials, required only for refunds
    pub disbursement_subscription_key: Option<SecretString>,
    pub disbursement_api_user: Option<String>,
    pub disbursement_api_key: Option<SecretString>,
}

impl MtnMomoSettings {
    /// True when the disbursement product trio is fully present.
    pub fn has_disbursement(&self) -> bool {
        self.disbursement_subscription_key.is_some()
            && self.disbursement_api_user.is_some()
            && self.disbursement_api_key.is_some()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require(self.enabled, &self.subscription_key, "MTN_MOMO_SUBSCRIPTION_KEY")?;
        require_plain(self.enabled, &self.api_user, "MTN_MOMO_API_USER")?;
        require(self.enabled, &self.api_key, "MTN_MOMO_API_KEY")?;

        let trio = [
            self.disbursement_subscription_key.is_some(),
            self.disbursement_api_user.is_some(),
            self.disbursement_api_key.is_some(),
        ];
        if self.enabled && trio.iter().any(|p| *p) && !trio.iter().all(|p| *p) {
            return Err(ValidationError::MissingRequired(
                "MTN_MOMO_DISBURSEMENT_SUBSCRIPTION_KEY, _API_USER and _API_KEY must be set together",
            ));
        }
        Ok(())
    }
}

impl Default for MtnMomoSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            subscription_key: None,
            api_user: None,
            api_key: None,
            target_environment: default_mtn_environment(),
            msisdn_prefix: default_mtn_prefix(),
            disbursement_subscription_key: None,
            disbursement_api_user: None,
            disbursement_api_key: None,
        }
    }
}

fn default_mtn_environment() -> String {
    "sandbox".to_string()
}

fn default_mtn_prefix() -> String {
    "256".to_string()
}

/// Airtel Money settings
///
/// Airtel binds one integration to one market, so the country, currency,
/// and dialing prefix are part of the credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AirtelMoneySettings {
    #[serde(default)]
    pub enabled: bool,

    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,

    /// ISO country the integration is registered for, e.g. `TZ`
    pub country: Option<String>,

    /// Settlement currency, e.g. `TZS`
    pub currency: Option<String>,

    /// Dialing prefix stripped during MSISDN normalization, e.g. `255`
    pub dialing_prefix: Option<String>,

    /// Encrypted disbursement PIN, required only for refunds
    pub disbursement_pin: Option<SecretString>,
}

impl AirtelMoneySettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_plain(self.enabled, &self.client_id, "AIRTEL_CLIENT_ID")?;
        require(self.enabled, &self.client_secret, "AIRTEL_CLIENT_SECRET")?;
        require_plain(self.enabled, &self.country, "AIRTEL_COUNTRY")?;
        require_plain(self.enabled, &self.currency, "AIRTEL_CURRENCY")?;
        require_plain(self.enabled, &self.dialing_prefix, "AIRTEL_DIALING_PREFIX")?;

        if self.enabled {
            let known = self
                .currency
                .as_deref()
                .and_then(CurrencyCode::from_code)
                .is_some();
            if !known {
                return Err(ValidationError::UnknownCurrency("AIRTEL_CURRENCY"));
            }
        }
        Ok(())
    }
}

//! Data transfer objects for the WHMCS provisioning API.

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::application::whmcs::{CreateStoreRequest, CreatedStore, StatusReport};

// ═══════════════════════════════════════════════════════════════════════════
// Request DTOs
// ═══════════════════════════════════════════════════════════════════════════

/// Payload for the `create` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStoreDto {
    /// Store display name.
    pub name: String,
    /// Merchant email, becomes the store admin login.
    pub email: String,
    /// Store domain.
    pub domain: String,
    /// ISO 3166-1 alpha-2 country.
    pub country: String,
    /// ISO 4217 currency.
    pub currency: String,
    /// Billing plan code.
    #[serde(default)]
    pub plan: Option<String>,
    /// Skip certificate issuance, for signups whose DNS is not live yet.
    #[serde(default)]
    pub skip_ssl: bool,
}

impl CreateStoreDto {
    pub fn into_request(self) -> CreateStoreRequest {
        CreateStoreRequest {
            name: self.name,
            admin_email: self.email,
            domain: self.domain,
            country: self.country,
            currency: self.currency,
            plan_code: self.plan,
            skip_ssl: self.skip_ssl,
        }
    }
}

/// Payload for the lifecycle actions (suspend, unsuspend, terminate,
/// changeplan, status).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleDto {
    /// Tenant id or store domain, whichever the billing module stored.
    pub reference: String,
    /// New plan code, required for `changeplan` only.
    #[serde(default)]
    pub plan: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Response DTOs
// ═══════════════════════════════════════════════════════════════════════════

/// Uniform envelope the billing module parses for yes/no actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ModuleResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Response for `create`, carrying the one-time admin credential for the
/// welcome mail. The password is not retrievable again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedStoreResponse {
    pub success: bool,
    pub tenant_id: String,
    pub store_url: String,
    pub admin_email: String,
    pub admin_password: String,
    pub version: String,
    pub ssl_active: bool,
}

impl From<CreatedStore> for CreatedStoreResponse {
    fn from(created: CreatedStore) -> Self {
        Self {
            success: true,
            tenant_id: created.receipt.tenant_id.to_string(),
            store_url: created.receipt.store_url,
            admin_email: created.receipt.admin_email,
            admin_password: created.receipt.admin_password.expose_secret().to_string(),
            version: created.receipt.installed_version,
            ssl_active: created.ssl_active,
        }
    }
}

/// Response for `status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: StatusReport,
}

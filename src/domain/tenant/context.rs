//! Tenant context passed explicitly into payment selection.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CountryCode, CurrencyCode, TenantId};

/// The tenant attributes payment routing decisions depend on.
///
/// Passed explicitly to every `PaymentManager` call. Nothing in the payment
/// layer reads ambient per-request state, which keeps gateway selection
/// testable and makes cross-tenant leakage a type error rather than a
/// runtime bug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub country: CountryCode,
    pub currency: CurrencyCode,
}

impl TenantContext {
    /// Builds a context from raw parts.
    pub fn new(tenant_id: TenantId, country: CountryCode, currency: CurrencyCode) -> Self {
        Self {
            tenant_id,
            country,
            currency,
        }
    }
}

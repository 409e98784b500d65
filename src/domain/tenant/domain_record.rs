//! Tenant domain entity.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainId, TenantId, Timestamp};

use super::Hostname;

/// One hostname attached to a tenant store.
///
/// Every tenant has exactly one primary domain (the platform subdomain it
/// was provisioned under); merchants may attach additional custom domains
/// which go through verification before TLS is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantDomain {
    pub id: DomainId,
    pub tenant_id: TenantId,
    pub hostname: Hostname,
    pub is_primary: bool,
    pub verified: bool,
    pub ssl_enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TenantDomain {
    /// Creates an unverified domain record.
    pub fn new(tenant_id: TenantId, hostname: Hostname, is_primary: bool) -> Self {
        let now = Timestamp::now();
        Self {
            id: DomainId::new(),
            tenant_id,
            hostname,
            is_primary,
            verified: is_primary, // platform subdomains need no ownership check
            ssl_enabled: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks ownership as proven.
    pub fn mark_verified(&mut self) {
        self.verified = true;
        self.updated_at = Timestamp::now();
    }

    /// Records that HTTPS is now being served for this hostname.
    pub fn enable_ssl(&mut self) {
        self.ssl_enabled = true;
        self.updated_at = Timestamp::now();
    }

    /// Records that HTTPS was switched off (revocation, domain change).
    pub fn disable_ssl(&mut self) {
        self.ssl_enabled = false;
        self.updated_at = Timestamp::now();
    }
}

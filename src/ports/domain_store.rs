//! Tenant domain store port.

use async_trait::async_trait;

use crate::domain::foundation::TenantId;
use crate::domain::tenant::{Hostname, TenantDomain};

use super::StoreError;

/// Repository port for TenantDomain records.
///
/// Implementations enforce the one-primary-per-tenant invariant on save:
/// saving a primary domain for a tenant that already has one is a conflict.
#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Save a new domain record.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the hostname is taken or a second primary is added
    async fn save(&self, domain: &TenantDomain) -> Result<(), StoreError>;

    /// Update an existing domain record.
    async fn update(&self, domain: &TenantDomain) -> Result<(), StoreError>;

    /// All domains attached to a tenant.
    async fn list_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<TenantDomain>, StoreError>;

    /// Find a domain record by hostname.
    async fn find_by_hostname(&self, hostname: &Hostname)
        -> Result<Option<TenantDomain>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait object safety test
    #[test]
    fn domain_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn DomainStore) {}
    }
}

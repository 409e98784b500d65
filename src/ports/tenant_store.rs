//! Tenant store port.

use async_trait::async_trait;

use crate::domain::foundation::TenantId;
use crate::domain::tenant::{Hostname, Tenant};

use super::StoreError;

/// Repository port for Tenant aggregate persistence.
///
/// Soft-deleted tenants stay findable by id (termination must be
/// idempotent) but are excluded from hostname lookups and sweeps.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Save a new tenant.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the primary domain is already taken
    async fn save(&self, tenant: &Tenant) -> Result<(), StoreError>;

    /// Update an existing tenant.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the tenant does not exist
    async fn update(&self, tenant: &Tenant) -> Result<(), StoreError>;

    /// Find a tenant by its ID, including soft-deleted ones.
    async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError>;

    /// Find a live tenant by its primary domain.
    async fn find_by_primary_domain(
        &self,
        hostname: &Hostname,
    ) -> Result<Option<Tenant>, StoreError>;

    /// Live tenants with an active certificate expiring within `days`.
    ///
    /// Feeds the renewal sweep.
    async fn find_ssl_expiring_within(&self, days: i64) -> Result<Vec<Tenant>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait object safety test
    #[test]
    fn tenant_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn TenantStore) {}
    }
}

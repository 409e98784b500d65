//! In-memory tenant store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::TenantId;
use crate::domain::tenant::{Hostname, SslStatus, Tenant};
use crate::ports::{StoreError, TenantStore};

/// In-memory [`TenantStore`].
///
/// Honors the port's soft-delete semantics: terminated tenants stay
/// findable by id but vanish from hostname lookups and the renewal sweep.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTenantStore {
    tenants: Arc<RwLock<HashMap<TenantId, Tenant>>>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tenants, soft-deleted included.
    pub async fn count(&self) -> usize {
        self.tenants.read().await.len()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn save(&self, tenant: &Tenant) -> Result<(), StoreError> {
        let mut tenants = self.tenants.write().await;
        if tenants.contains_key(&tenant.id) {
            return Err(StoreError::conflict(format!(
                "tenant '{}' already saved",
                tenant.id
            )));
        }
        let domain_taken = tenants
            .values()
            .any(|t| !t.is_deleted() && t.primary_domain == tenant.primary_domain);
        if domain_taken {
            return Err(StoreError::conflict(format!(
                "primary domain '{}' already taken",
                tenant.primary_domain
            )));
        }
        tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn update(&self, tenant: &Tenant) -> Result<(), StoreError> {
        let mut tenants = self.tenants.write().await;
        if !tenants.contains_key(&tenant.id) {
            return Err(StoreError::not_found("tenant", tenant.id));
        }
        tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError> {
        Ok(self.tenants.read().await.get(id).cloned())
    }

    async fn find_by_primary_domain(
        &self,
        hostname: &Hostname,
    ) -> Result<Option<Tenant>, StoreError> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .values()
            .find(|t| !t.is_deleted() && t.primary_domain == *hostname)
            .cloned())
    }

    async fn find_ssl_expiring_within(&self, days: i64) -> Result<Vec<Tenant>, StoreError> {
        let tenants = self.tenants.read().await;
        let mut due: Vec<Tenant> = tenants
            .values()
            .filter(|t| {
                !t.is_deleted()
                    && t.ssl_status == SslStatus::Active
                    && t.ssl_cert
                        .map(|cert| cert.expires_within_days(days))
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.primary_domain
                .as_str()
                .cmp(b.primary_domain.as_str())
        });
        Ok(due)
    }
}

//! In-memory tenant domain store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainId, TenantId};
use crate::domain::tenant::{Hostname, TenantDomain};
use crate::ports::{DomainStore, StoreError};

/// In-memory [`DomainStore`].
///
/// Enforces hostname uniqueness and the one-primary-per-tenant rule on
/// save, as the port requires.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDomainStore {
    domains: Arc<RwLock<HashMap<DomainId, TenantDomain>>>,
}

impl InMemoryDomainStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DomainStore for InMemoryDomainStore {
    async fn save(&self, domain: &TenantDomain) -> Result<(), StoreError> {
        let mut domains = self.domains.write().await;
        if domains.values().any(|d| d.hostname == domain.hostname) {
            return Err(StoreError::conflict(format!(
                "hostname '{}' already attached",
                domain.hostname
            )));
        }
        let second_primary = domain.is_primary
            && domains
                .values()
                .any(|d| d.tenant_id == domain.tenant_id && d.is_primary);
        if second_primary {
            return Err(StoreError::conflict(format!(
                "tenant '{}' already has a primary domain",
                domain.tenant_id
            )));
        }
        domains.insert(domain.id, domain.clone());
        Ok(())
    }

    async fn update(&self, domain: &TenantDomain) -> Result<(), StoreError> {
        let mut domains = self.domains.write().await;
        if !domains.contains_key(&domain.id) {
            return Err(StoreError::not_found("domain", domain.id));
        }
        domains.insert(domain.id, domain.clone());
        Ok(())
    }

    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<TenantDomain>, StoreError> {
        let domains = self.domains.read().await;
        let mut list: Vec<TenantDomain> = domains
            .values()
            .filter(|d| d.tenant_id == *tenant_id)
            .cloned()
            .collect();
        // Primary first, then alphabetical, so callers get a stable order.
        list.sort_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then_with(|| a.hostname.as_str().cmp(b.hostname.as_str()))
        });
        Ok(list)
    }

    async fn find_by_hostname(
        &self,
        hostname: &Hostname,
    ) -> Result<Option<TenantDomain>, StoreError> {
        let domains = self.domains.read().await;
        Ok(domains
            .values()
            .find(|d| d.hostname == *hostname)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str) -> Hostname {
        Hostname::new(name).unwrap()
    }

    #[tokio::test]
    async fn hostname_can_only_be_attached_once() {
        let store = InMemoryDomainStore::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        store
            .save(&TenantDomain::new(tenant_a, host("shop.vumashops.com"), true))
            .await
            .unwrap();

        let err = store
            .save(&TenantDomain::new(tenant_b, host("shop.vumashops.com"), true))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn second_primary_for_a_tenant_is_rejected() {
        let store = InMemoryDomainStore::new();
        let tenant = TenantId::new();

        store
            .save(&TenantDomain::new(tenant, host("shop.vumashops.com"), true))
            .await
            .unwrap();

        let err = store
            .save(&TenantDomain::new(tenant, host("other.vumashops.com"), true))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        store
            .save(&TenantDomain::new(tenant, host("www.dukamoja.co.tz"), false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_puts_the_primary_first() {
        let store = InMemoryDomainStore::new();
        let tenant = TenantId::new();

        store
            .save(&TenantDomain::new(tenant, host("aaa.dukamoja.co.tz"), false))
            .await
            .unwrap();
        store
            .save(&TenantDomain::new(tenant, host("shop.vumashops.com"), true))
            .await
            .unwrap();

        let list = store.list_for_tenant(&tenant).await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[0].is_primary);
        assert_eq!(list[1].hostname.as_str(), "aaa.dukamoja.co.tz");
    }

    #[tokio::test]
    async fn update_persists_flag_changes() {
        let store = InMemoryDomainStore::new();
        let mut domain =
            TenantDomain::new(TenantId::new(), host("www.dukamoja.co.tz"), false);
        store.save(&domain).await.unwrap();

        domain.mark_verified();
        domain.enable_ssl();
        store.update(&domain).await.unwrap();

        let loaded = store
            .find_by_hostname(&host("www.dukamoja.co.tz"))
            .await
            .unwrap()
            .unwrap();
        assert!(loaded.verified);
        assert!(loaded.ssl_enabled);
    }
}

//! Per-tenant serialization of provisioning work.
//!
//! Provisioning, certificate issuance, and nginx rewrites for one tenant
//! must never interleave: two writers racing on the same vhost file or
//! install path corrupt it. Work for distinct tenants has no shared state
//! and runs fully parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use crate::domain::foundation::TenantId;

/// Hands out one async mutex per tenant, created on first use.
///
/// Callers hold the returned `Arc` and lock it across the whole pipeline
/// run, including await points.
#[derive(Debug, Clone, Default)]
pub struct TenantLocks {
    locks: Arc<StdMutex<HashMap<TenantId, Arc<Mutex<()>>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for one tenant. Repeated calls return the same mutex.
    pub fn for_tenant(&self, tenant_id: TenantId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        Arc::clone(locks.entry(tenant_id).or_default())
    }

    /// Number of tenants that have ever requested a lock (test helper).
    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

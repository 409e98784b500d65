//! WHMCS billing integration service.
//!
//! The billing system drives the tenant lifecycle through six commands:
//! `create`, `suspend`, `unsuspend`, `terminate`, `changePlan`, and
//! `status`. `create` runs the whole onboarding flow (tenant record, domain
//! record, provisioning pipeline, vhost, certificate); the rest map onto one
//! lifecycle transition each. Tenants are referenced by whichever identifier
//! the billing module stored at signup, the tenant id or the store domain.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::application::provisioner::{BagistoProvisioner, ProvisionReceipt, ProvisioningError};
use crate::application::ssl_manager::SslManager;
use crate::domain::foundation::{
    CountryCode, CurrencyCode, TenantId, TransitionError, ValidationError,
};
use crate::domain::tenant::{Hostname, SslStatus, SubscriptionStatus, Tenant, TenantDomain};
use crate::ports::{DomainStore, Notification, NotificationSink, StoreError, TenantStore};

/// Errors surfaced to the billing system.
#[derive(Debug, Error)]
pub enum WhmcsError {
    /// The reference matches no tenant, neither as an id nor as a domain.
    #[error("no tenant matches '{0}'")]
    UnknownTenant(String),

    /// The tenant has been terminated.
    #[error("tenant '{0}' is terminated")]
    Terminated(TenantId),

    /// The requested domain is attached to another store.
    #[error("domain '{0}' is attached to another store")]
    DomainTaken(String),

    /// A request field failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The subscription does not allow the requested transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The provisioning pipeline failed, naming the step.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// Tenant persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything the billing system sends to stand up a store.
#[derive(Debug, Clone)]
pub struct CreateStoreRequest {
    pub name: String,
    pub admin_email: String,
    pub domain: String,
    pub country: String,
    pub currency: String,
    pub plan_code: Option<String>,

    /// Skip certificate issuance, for signups whose DNS is not live yet.
    pub skip_ssl: bool,
}

/// Outcome of `create`, feeding the billing system's welcome mail.
#[derive(Debug, Clone)]
pub struct CreatedStore {
    pub receipt: ProvisionReceipt,

    /// Whether HTTPS came up during this call. `false` is not fatal: the
    /// store serves plain HTTP and issuance retries once DNS propagates.
    pub ssl_active: bool,
}

/// Snapshot of one tenant for the billing system's service view.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusReport {
    pub tenant_id: TenantId,
    pub name: String,
    pub store_url: String,
    pub subscription: SubscriptionStatus,
    pub ssl_status: SslStatus,
    pub installed_version: Option<String>,
    pub terminated: bool,
}

/// Application service behind the WHMCS provisioning API.
pub struct WhmcsService {
    tenants: Arc<dyn TenantStore>,
    domains: Arc<dyn DomainStore>,
    notifications: Arc<dyn NotificationSink>,
    provisioner: Arc<BagistoProvisioner>,
    ssl: Arc<SslManager>,
}

impl WhmcsService {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        domains: Arc<dyn DomainStore>,
        notifications: Arc<dyn NotificationSink>,
        provisioner: Arc<BagistoProvisioner>,
        ssl: Arc<SslManager>,
    ) -> Self {
        Self {
            tenants,
            domains,
            notifications,
            provisioner,
            ssl,
        }
    }

    /// Full onboarding: tenant record, provisioning pipeline, vhost, and
    /// certificate, then subscription activation.
    ///
    /// A domain whose previous run failed resumes with the same tenant
    /// record; the pipeline's cleanup left nothing behind, so the retry
    /// starts from scratch. Certificate failure does not fail the call,
    /// because fresh signups rarely have DNS propagated yet.
    pub async fn create(&self, request: CreateStoreRequest) -> Result<CreatedStore, WhmcsError> {
        let hostname: Hostname = request.domain.parse()?;
        let country = CountryCode::new(&request.country)?;
        let currency: CurrencyCode = request.currency.parse()?;

        let mut tenant = match self.tenants.find_by_primary_domain(&hostname).await? {
            Some(existing) => {
                info!(tenant_id = %existing.id, %hostname, "resuming onboarding for known domain");
                existing
            }
            None => {
                let tenant = Tenant::create(&request.name, hostname.clone(), country, currency);
                self.tenants.save(&tenant).await?;
                tenant
            }
        };
        if let Some(plan_code) = &request.plan_code {
            tenant.change_plan(plan_code);
            self.tenants.update(&tenant).await?;
        }

        self.ensure_primary_domain_record(&tenant).await?;

        let receipt = self
            .provisioner
            .provision(&tenant.id, &request.admin_email)
            .await?;

        if let Err(ssl_error) = self.ssl.install_http_vhost(&tenant.id).await {
            warn!(
                tenant_id = %tenant.id,
                error = %ssl_error,
                "HTTP vhost installation failed, store unreachable until the vhost is applied"
            );
        }

        let mut ssl_active = false;
        if request.skip_ssl {
            info!(tenant_id = %tenant.id, "certificate issuance skipped on request");
        } else {
            match self.ssl.issue_certificate(&tenant.id).await {
                Ok(_) => {
                    ssl_active = true;
                    self.mark_domain_ssl_enabled(&hostname).await;
                }
                Err(ssl_error) => {
                    warn!(
                        tenant_id = %tenant.id,
                        error = %ssl_error,
                        "certificate issuance failed during onboarding, retriable once DNS points here"
                    );
                }
            }
        }

        // Provisioning and issuance wrote to the record; reload before the
        // subscription transition.
        let mut tenant = self
            .tenants
            .find_by_id(&tenant.id)
            .await?
            .ok_or_else(|| WhmcsError::UnknownTenant(tenant.id.to_string()))?;
        tenant.activate()?;
        self.tenants.update(&tenant).await?;

        let notification = Notification::StoreReady {
            tenant_id: tenant.id,
            store_url: receipt.store_url.clone(),
            admin_email: receipt.admin_email.clone(),
        };
        if let Err(delivery_error) = self.notifications.deliver(notification).await {
            warn!(tenant_id = %tenant.id, error = %delivery_error, "store-ready notification failed");
        }

        info!(
            tenant_id = %tenant.id,
            store_url = %receipt.store_url,
            ssl_active,
            "store onboarding complete"
        );
        Ok(CreatedStore { receipt, ssl_active })
    }

    /// Suspends the store on billing instruction.
    pub async fn suspend(&self, reference: &str) -> Result<(), WhmcsError> {
        let mut tenant = self.serving_tenant(reference).await?;
        tenant.suspend()?;
        self.tenants.update(&tenant).await?;
        info!(tenant_id = %tenant.id, "store suspended on billing instruction");
        Ok(())
    }

    /// Lifts a suspension after the overdue invoice settles.
    pub async fn unsuspend(&self, reference: &str) -> Result<(), WhmcsError> {
        let mut tenant = self.serving_tenant(reference).await?;
        tenant.unsuspend()?;
        self.tenants.update(&tenant).await?;
        info!(tenant_id = %tenant.id, "store unsuspended");
        Ok(())
    }

    /// Terminates the tenant: subscription expires and the record is
    /// soft-deleted. Store data stays on disk and in MySQL. Idempotent,
    /// so billing retries are safe.
    pub async fn terminate(&self, reference: &str) -> Result<(), WhmcsError> {
        let mut tenant = self.resolve(reference).await?;
        tenant.terminate()?;
        self.tenants.update(&tenant).await?;
        info!(tenant_id = %tenant.id, "store terminated, record soft-deleted, data retained");
        Ok(())
    }

    /// Records a plan change from billing.
    pub async fn change_plan(&self, reference: &str, plan_code: &str) -> Result<(), WhmcsError> {
        let mut tenant = self.serving_tenant(reference).await?;
        tenant.change_plan(plan_code);
        self.tenants.update(&tenant).await?;
        info!(tenant_id = %tenant.id, plan_code, "plan changed");
        Ok(())
    }

    /// Current state of one tenant, terminated ones included.
    pub async fn status(&self, reference: &str) -> Result<StatusReport, WhmcsError> {
        let tenant = self.resolve(reference).await?;
        Ok(StatusReport {
            tenant_id: tenant.id,
            name: tenant.name.clone(),
            store_url: format!("https://{}", tenant.primary_domain),
            subscription: tenant.subscription,
            ssl_status: tenant.ssl_status,
            installed_version: tenant.installed_version.clone(),
            terminated: tenant.is_deleted(),
        })
    }

    /// Looks up a tenant by id first, then by primary domain. Id lookups
    /// find terminated tenants too; domain lookups are live-only.
    async fn resolve(&self, reference: &str) -> Result<Tenant, WhmcsError> {
        if let Ok(tenant_id) = reference.parse::<TenantId>() {
            if let Some(tenant) = self.tenants.find_by_id(&tenant_id).await? {
                return Ok(tenant);
            }
        }
        if let Ok(hostname) = Hostname::new(reference) {
            if let Some(tenant) = self.tenants.find_by_primary_domain(&hostname).await? {
                return Ok(tenant);
            }
        }
        Err(WhmcsError::UnknownTenant(reference.to_string()))
    }

    async fn serving_tenant(&self, reference: &str) -> Result<Tenant, WhmcsError> {
        let tenant = self.resolve(reference).await?;
        if tenant.is_deleted() {
            return Err(WhmcsError::Terminated(tenant.id));
        }
        Ok(tenant)
    }

    async fn ensure_primary_domain_record(&self, tenant: &Tenant) -> Result<(), WhmcsError> {
        match self.domains.find_by_hostname(&tenant.primary_domain).await? {
            Some(record) if record.tenant_id == tenant.id => Ok(()),
            Some(_) => Err(WhmcsError::DomainTaken(tenant.primary_domain.to_string())),
            None => {
                let record = TenantDomain::new(tenant.id, tenant.primary_domain.clone(), true);
                self.domains.save(&record).await?;
                Ok(())
            }
        }
    }

    /// Best-effort flag flip on the domain record. The tenant row is the
    /// source of truth for certificate state.
    async fn mark_domain_ssl_enabled(&self, hostname: &Hostname) {
        let mut record = match self.domains.find_by_hostname(hostname).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(store_error) => {
                warn!(%hostname, error = %store_error, "domain record lookup failed");
                return;
            }
        };
        record.enable_ssl();
        if let Err(store_error) = self.domains.update(&record).await {
            warn!(%hostname, error = %store_error, "domain record update failed");
        }
    }
}

//! Tenant aggregate entity.
//!
//! A Tenant is one merchant store: its domain, locale, billing status,
//! certificate state, and installation footprint on the app server.
//!
//! # Invariants
//!
//! - `primary_domain` is always a valid hostname
//! - Billing and SSL transitions follow their state machines
//! - Admin passwords are stored only as argon2 hashes

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    CountryCode, CurrencyCode, StateMachine, TenantId, Timestamp, TransitionError,
};

use super::{Hostname, SslStatus, SubscriptionStatus, TenantContext};

/// Settings key holding the token for TXT-record domain verification.
pub const VERIFICATION_TOKEN_KEY: &str = "domain_verification_token";

/// Certificate issuance record for the primary domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslCertInfo {
    /// When the current certificate was issued.
    pub issued_at: Timestamp,

    /// When the current certificate expires.
    pub expires_at: Timestamp,
}

impl SslCertInfo {
    /// True when the certificate expires within the given window.
    pub fn expires_within_days(&self, days: i64) -> bool {
        self.expires_at.days_from_now() <= days
    }
}

/// Store admin login, password kept only as an argon2 PHC hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCredential {
    pub email: String,
    pub password_hash: String,
}

/// Tenant aggregate - one merchant store on the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique identifier for this tenant.
    pub id: TenantId,

    /// Store display name.
    pub name: String,

    /// Primary domain the store is served on.
    pub primary_domain: Hostname,

    /// Merchant's country, drives gateway selection.
    pub country: CountryCode,

    /// Store currency, drives gateway selection.
    pub currency: CurrencyCode,

    /// BCP 47 locale for the storefront, e.g. "en" or "sw".
    pub locale: String,

    /// IANA timezone for the storefront, e.g. "Africa/Nairobi".
    pub timezone: String,

    /// Billing lifecycle status.
    pub subscription: SubscriptionStatus,

    /// Billing plan code as known to WHMCS.
    pub plan_code: Option<String>,

    /// Certificate pipeline status for the primary domain.
    pub ssl_status: SslStatus,

    /// Current certificate, once one has been issued.
    pub ssl_cert: Option<SslCertInfo>,

    /// Filesystem root of the installed store, once provisioned.
    pub install_path: Option<PathBuf>,

    /// Storefront version that was installed.
    pub installed_version: Option<String>,

    /// When provisioning completed.
    pub installed_at: Option<Timestamp>,

    /// Store admin credential, set at the end of provisioning.
    pub admin: Option<AdminCredential>,

    /// Free-form settings, including the domain verification token.
    pub settings: HashMap<String, String>,

    /// When the tenant was created.
    pub created_at: Timestamp,

    /// When the tenant was last updated.
    pub updated_at: Timestamp,

    /// Soft-delete marker set by termination.
    pub deleted_at: Option<Timestamp>,
}

impl Tenant {
    /// Creates a tenant in trial, with a fresh domain verification token.
    pub fn create(
        name: impl Into<String>,
        primary_domain: Hostname,
        country: CountryCode,
        currency: CurrencyCode,
    ) -> Self {
        let now = Timestamp::now();
        let mut settings = HashMap::new();
        settings.insert(
            VERIFICATION_TOKEN_KEY.to_string(),
            uuid::Uuid::new_v4().simple().to_string(),
        );
        Self {
            id: TenantId::new(),
            name: name.into(),
            primary_domain,
            country,
            currency,
            locale: "en".to_string(),
            timezone: "Africa/Nairobi".to_string(),
            subscription: SubscriptionStatus::Trial,
            plan_code: None,
            ssl_status: SslStatus::Pending,
            ssl_cert: None,
            install_path: None,
            installed_version: None,
            installed_at: None,
            admin: None,
            settings,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Payment-selection context for this tenant.
    pub fn context(&self) -> TenantContext {
        TenantContext {
            tenant_id: self.id,
            country: self.country.clone(),
            currency: self.currency,
        }
    }

    /// Token expected in the TXT record during domain verification.
    pub fn verification_token(&self) -> Option<&str> {
        self.settings.get(VERIFICATION_TOKEN_KEY).map(String::as_str)
    }

    /// True once termination has soft-deleted the tenant.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    // ------------------------------------------------------------------
    // Billing lifecycle
    // ------------------------------------------------------------------

    /// Activates the subscription after payment.
    pub fn activate(&mut self) -> Result<(), TransitionError> {
        self.subscription = self.subscription.transition_to(SubscriptionStatus::Active)?;
        self.touch();
        Ok(())
    }

    /// Suspends the store on billing instruction.
    pub fn suspend(&mut self) -> Result<(), TransitionError> {
        self.subscription = self
            .subscription
            .transition_to(SubscriptionStatus::Suspended)?;
        self.touch();
        Ok(())
    }

    /// Lifts a suspension.
    pub fn unsuspend(&mut self) -> Result<(), TransitionError> {
        self.subscription = self.subscription.transition_to(SubscriptionStatus::Active)?;
        self.touch();
        Ok(())
    }

    /// Records merchant cancellation.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.subscription = self
            .subscription
            .transition_to(SubscriptionStatus::Cancelled)?;
        self.touch();
        Ok(())
    }

    /// Terminates the tenant: subscription expires and the record is
    /// soft-deleted. Idempotent.
    pub fn terminate(&mut self) -> Result<(), TransitionError> {
        if self.subscription != SubscriptionStatus::Expired {
            self.subscription = self
                .subscription
                .transition_to(SubscriptionStatus::Expired)?;
        }
        if self.deleted_at.is_none() {
            self.deleted_at = Some(Timestamp::now());
        }
        self.touch();
        Ok(())
    }

    /// Records a plan change from billing.
    pub fn change_plan(&mut self, plan_code: impl Into<String>) {
        self.plan_code = Some(plan_code.into());
        self.touch();
    }

    // ------------------------------------------------------------------
    // Certificate pipeline
    // ------------------------------------------------------------------

    /// Enters the DNS verification step.
    pub fn begin_ssl_verification(&mut self) -> Result<(), TransitionError> {
        self.ssl_status = self.ssl_status.transition_to(SslStatus::Verifying)?;
        self.touch();
        Ok(())
    }

    /// Enters the ACME issuance step.
    pub fn begin_ssl_issuance(&mut self) -> Result<(), TransitionError> {
        self.ssl_status = self.ssl_status.transition_to(SslStatus::Issuing)?;
        self.touch();
        Ok(())
    }

    /// Records a successfully installed certificate.
    pub fn mark_ssl_active(&mut self, cert: SslCertInfo) -> Result<(), TransitionError> {
        self.ssl_status = self.ssl_status.transition_to(SslStatus::Active)?;
        self.ssl_cert = Some(cert);
        self.touch();
        Ok(())
    }

    /// Records a pipeline failure. Retriable.
    pub fn mark_ssl_failed(&mut self) -> Result<(), TransitionError> {
        self.ssl_status = self.ssl_status.transition_to(SslStatus::Failed)?;
        self.touch();
        Ok(())
    }

    /// Resets the pipeline after revocation or a domain change.
    pub fn reset_ssl(&mut self) -> Result<(), TransitionError> {
        self.ssl_status = self.ssl_status.transition_to(SslStatus::Pending)?;
        self.ssl_cert = None;
        self.touch();
        Ok(())
    }

    /// Replaces the certificate record after a renewal, keeping status.
    pub fn record_ssl_renewal(&mut self, cert: SslCertInfo) {
        self.ssl_cert = Some(cert);
        self.touch();
    }

    // ------------------------------------------------------------------
    // Installation footprint
    // ------------------------------------------------------------------

    /// Records a completed store installation.
    pub fn record_install(&mut self, path: PathBuf, version: impl Into<String>) {
        self.install_path = Some(path);
        self.installed_version = Some(version.into());
        self.installed_at = Some(Timestamp::now());
        self.touch();
    }

    /// Stores the admin credential. The hash must already be argon2.
    pub fn set_admin_credential(&mut self, email: impl Into<String>, password_hash: String) {
        self.admin = Some(AdminCredential {
            email: email.into(),
            password_hash,
        });
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

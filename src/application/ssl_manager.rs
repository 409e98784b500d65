//! Certificate issuance and renewal orchestration.
//!
//! Drives a tenant domain through `pending -> verifying -> issuing ->
//! active`, with `failed` recorded from either in-flight step. Failures are
//! retriable by calling [`SslManager::issue_certificate`] again. DNS
//! propagation lag is the expected failure mode, so the ownership check runs
//! before anything expensive and a mismatch costs one lookup.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::adapters::provisioning::{NginxConfigGenerator, NginxError, TlsPaths};
use crate::application::dns_verifier::DnsVerifier;
use crate::application::locks::TenantLocks;
use crate::domain::foundation::{TenantId, TransitionError};
use crate::domain::tenant::{SslCertInfo, Tenant};
use crate::ports::{
    CertificateIssuer, DnsError, IssuedCertificate, IssuerError, StoreError, TenantStore,
};

/// Certificates expiring within this many days are picked up by the sweep.
pub const RENEWAL_WINDOW_DAYS: i64 = 30;

/// Errors from the certificate pipeline.
#[derive(Debug, Error)]
pub enum SslError {
    /// No tenant with the given id.
    #[error("tenant '{0}' not found")]
    TenantNotFound(TenantId),

    /// The tenant has been terminated.
    #[error("tenant '{0}' is terminated")]
    TenantTerminated(TenantId),

    /// The tenant has no installed store to serve.
    #[error("tenant '{0}' has no installed store, provision it first")]
    NotInstalled(TenantId),

    /// Ownership lookups succeeded but neither proof was present.
    #[error("domain ownership for '{hostname}' could not be proven")]
    DomainNotVerified { hostname: String },

    /// DNS infrastructure failure during the ownership check.
    #[error(transparent)]
    Dns(#[from] DnsError),

    /// The ACME tooling failed or timed out.
    #[error(transparent)]
    Issuance(#[from] IssuerError),

    /// Vhost regeneration failed.
    #[error(transparent)]
    Nginx(#[from] NginxError),

    /// The tenant's SSL status does not allow the requested step.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Tenant persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Orchestrates domain verification, ACME issuance, and vhost switching.
///
/// All mutating operations hold the tenant's lock, so an issuance run never
/// races a provisioning run or a second issuance for the same tenant.
/// Distinct tenants proceed in parallel.
pub struct SslManager {
    tenants: Arc<dyn TenantStore>,
    verifier: DnsVerifier,
    issuer: Arc<dyn CertificateIssuer>,
    nginx: NginxConfigGenerator,
    locks: TenantLocks,
    acme_webroot: PathBuf,
}

impl SslManager {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        verifier: DnsVerifier,
        issuer: Arc<dyn CertificateIssuer>,
        nginx: NginxConfigGenerator,
        locks: TenantLocks,
        acme_webroot: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tenants,
            verifier,
            issuer,
            nginx,
            locks,
            acme_webroot: acme_webroot.into(),
        }
    }

    /// Writes and enables the plain-HTTP vhost for a provisioned tenant.
    ///
    /// This is the vhost that serves the ACME challenge path, so it must be
    /// live before [`issue_certificate`](Self::issue_certificate) can pass a
    /// webroot challenge.
    pub async fn install_http_vhost(&self, tenant_id: &TenantId) -> Result<(), SslError> {
        let lock = self.locks.for_tenant(*tenant_id);
        let _guard = lock.lock().await;

        let tenant = self.load_serving_tenant(tenant_id).await?;
        let app_path = self.installed_path(&tenant)?;

        let contents = self.nginx.render(&tenant.primary_domain, &app_path, None);
        self.nginx.apply(&tenant.primary_domain, &contents).await?;
        info!(tenant_id = %tenant.id, hostname = %tenant.primary_domain, "HTTP vhost installed");
        Ok(())
    }

    /// Runs the issuance pipeline for the tenant's primary domain.
    ///
    /// The DNS ownership check runs first and a mismatch lands `failed`
    /// without ever invoking the ACME tooling. On success the tenant is
    /// `active` with a stamped certificate and the vhost is regenerated in
    /// HTTPS mode.
    pub async fn issue_certificate(
        &self,
        tenant_id: &TenantId,
    ) -> Result<IssuedCertificate, SslError> {
        let lock = self.locks.for_tenant(*tenant_id);
        let _guard = lock.lock().await;

        let mut tenant = self.load_serving_tenant(tenant_id).await?;
        let app_path = self.installed_path(&tenant)?;
        let hostname = tenant.primary_domain.clone();
        let token = tenant.verification_token().unwrap_or_default().to_string();

        tenant.begin_ssl_verification()?;
        self.tenants.update(&tenant).await?;

        let verification = match self.verifier.verify(hostname.as_str(), &token).await {
            Ok(verification) => verification,
            Err(dns_error) => {
                self.record_failure(&mut tenant).await;
                return Err(dns_error.into());
            }
        };
        if !verification.is_verified() {
            warn!(
                tenant_id = %tenant.id,
                %hostname,
                "domain does not point at the platform yet, likely DNS propagation"
            );
            self.record_failure(&mut tenant).await;
            return Err(SslError::DomainNotVerified {
                hostname: hostname.to_string(),
            });
        }

        tenant.begin_ssl_issuance()?;
        self.tenants.update(&tenant).await?;

        let certificate = match self.issuer.issue(hostname.as_str(), &self.acme_webroot).await {
            Ok(certificate) => certificate,
            Err(issuer_error) => {
                error!(tenant_id = %tenant.id, %hostname, error = %issuer_error, "issuance failed");
                self.record_failure(&mut tenant).await;
                return Err(issuer_error.into());
            }
        };

        tenant.mark_ssl_active(SslCertInfo {
            issued_at: certificate.issued_at,
            expires_at: certificate.expires_at,
        })?;
        self.tenants.update(&tenant).await?;

        let tls = TlsPaths {
            cert_path: certificate.cert_path.clone(),
            key_path: certificate.key_path.clone(),
        };
        let contents = self.nginx.render(&hostname, &app_path, Some(&tls));
        if let Err(nginx_error) = self.nginx.apply(&hostname, &contents).await {
            // The certificate exists and is recorded; only the vhost switch
            // is outstanding.
            error!(
                tenant_id = %tenant.id,
                %hostname,
                error = %nginx_error,
                "certificate issued but HTTPS vhost activation failed"
            );
            return Err(nginx_error.into());
        }

        info!(tenant_id = %tenant.id, %hostname, "certificate issued, HTTPS vhost live");
        Ok(certificate)
    }

    /// Revokes the certificate record and returns the vhost to plain HTTP.
    pub async fn revoke(&self, tenant_id: &TenantId) -> Result<(), SslError> {
        let lock = self.locks.for_tenant(*tenant_id);
        let _guard = lock.lock().await;

        let mut tenant = self.load_serving_tenant(tenant_id).await?;
        tenant.reset_ssl()?;
        self.tenants.update(&tenant).await?;

        if let Some(app_path) = tenant.install_path.clone() {
            let contents = self.nginx.render(&tenant.primary_domain, &app_path, None);
            self.nginx.apply(&tenant.primary_domain, &contents).await?;
        }
        info!(tenant_id = %tenant.id, hostname = %tenant.primary_domain, "certificate revoked");
        Ok(())
    }

    /// Renews every live certificate expiring within the renewal window.
    ///
    /// Per-tenant failures are logged and skipped; the return value counts
    /// successful renewals only.
    pub async fn renew_due(&self) -> Result<usize, StoreError> {
        let due = self
            .tenants
            .find_ssl_expiring_within(RENEWAL_WINDOW_DAYS)
            .await?;
        let mut renewed = 0;

        for mut tenant in due {
            let lock = self.locks.for_tenant(tenant.id);
            let _guard = lock.lock().await;

            match self.issuer.renew(tenant.primary_domain.as_str()).await {
                Ok(certificate) => {
                    tenant.record_ssl_renewal(SslCertInfo {
                        issued_at: certificate.issued_at,
                        expires_at: certificate.expires_at,
                    });
                    if let Err(store_error) = self.tenants.update(&tenant).await {
                        error!(
                            tenant_id = %tenant.id,
                            error = %store_error,
                            "certificate renewed but the new expiry was not persisted"
                        );
                    }
                    renewed += 1;
                }
                Err(issuer_error) => {
                    warn!(
                        tenant_id = %tenant.id,
                        hostname = %tenant.primary_domain,
                        error = %issuer_error,
                        "certificate renewal failed"
                    );
                }
            }
        }

        info!(renewed, window_days = RENEWAL_WINDOW_DAYS, "renewal sweep finished");
        Ok(renewed)
    }

    async fn load_serving_tenant(&self, tenant_id: &TenantId) -> Result<Tenant, SslError> {
        let tenant = self
            .tenants
            .find_by_id(tenant_id)
            .await?
            .ok_or(SslError::TenantNotFound(*tenant_id))?;
        if tenant.is_deleted() {
            return Err(SslError::TenantTerminated(*tenant_id));
        }
        Ok(tenant)
    }

    fn installed_path(&self, tenant: &Tenant) -> Result<PathBuf, SslError> {
        tenant
            .install_path
            .clone()
            .ok_or(SslError::NotInstalled(tenant.id))
    }

    /// Best-effort `failed` transition. The original error is what the
    /// caller needs to see, so persistence problems here are only logged.
    async fn record_failure(&self, tenant: &mut Tenant) {
        if let Err(transition_error) = tenant.mark_ssl_failed() {
            error!(tenant_id = %tenant.id, error = %transition_error, "could not record SSL failure");
            return;
        }
        if let Err(store_error) = self.tenants.update(tenant).await {
            error!(tenant_id = %tenant.id, error = %store_error, "could not persist SSL failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use crate::adapters::memory::InMemoryTenantStore;
    use crate::adapters::provisioning::{StaticCertificateIssuer, StaticDnsResolver};
    use crate::domain::foundation::{CountryCode, CurrencyCode, Timestamp};
    use crate::domain::tenant::{Hostname, SslStatus};

    const SERVER_IP: Ipv4Addr = Ipv4Addr::new(41, 90, 12, 7);

    // ════════════════════════════════════════════════════════════════════════
    // Fixture
    // ════════════════════════════════════════════════════════════════════════

    struct Fixture {
        manager: SslManager,
        tenants: Arc<InMemoryTenantStore>,
        resolver: Arc<StaticDnsResolver>,
        issuer: Arc<StaticCertificateIssuer>,
        sites_available: PathBuf,
        sites_enabled: PathBuf,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let sites_available = dir.path().join("sites-available");
        let sites_enabled = dir.path().join("sites-enabled");
        std::fs::create_dir_all(&sites_available).unwrap();
        std::fs::create_dir_all(&sites_enabled).unwrap();

        let tenants = Arc::new(InMemoryTenantStore::new());
        let resolver = Arc::new(StaticDnsResolver::new());
        let issuer = Arc::new(StaticCertificateIssuer::new());
        let nginx =
            NginxConfigGenerator::new(sites_available.clone(), sites_enabled.clone(), "/var/www/letsencrypt")
                .without_reload();
        let manager = SslManager::new(
            tenants.clone(),
            DnsVerifier::new(resolver.clone(), SERVER_IP),
            issuer.clone(),
            nginx,
            TenantLocks::new(),
            "/var/www/letsencrypt",
        );

        Fixture {
            manager,
            tenants,
            resolver,
            issuer,
            sites_available,
            sites_enabled,
            _dir: dir,
        }
    }

    impl Fixture {
        async fn saved_tenant(&self, host: &str) -> Tenant {
            let mut tenant = Tenant::create(
                "Duka Moja",
                Hostname::new(host).unwrap(),
                CountryCode::new("KE").unwrap(),
                CurrencyCode::KES,
            );
            tenant.record_install(PathBuf::from("/var/www/tenants/duka-moja"), "2.2.2");
            self.tenants.save(&tenant).await.unwrap();
            tenant
        }

        fn point_dns_at_platform(&self, host: &str) {
            self.resolver.set_a(host, vec![SERVER_IP]);
        }

        async fn stored(&self, id: &TenantId) -> Tenant {
            self.tenants.find_by_id(id).await.unwrap().unwrap()
        }

        fn vhost_contents(&self, host: &str) -> String {
            std::fs::read_to_string(self.sites_available.join(format!("{host}.conf"))).unwrap()
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Issuance
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn issuance_happy_path_reaches_active_with_certificate() {
        let f = fixture();
        let tenant = f.saved_tenant("duka.vumashops.com").await;
        f.point_dns_at_platform("duka.vumashops.com");

        let certificate = f.manager.issue_certificate(&tenant.id).await.unwrap();
        assert!(certificate.cert_path.ends_with("fullchain.pem"));

        let stored = f.stored(&tenant.id).await;
        assert_eq!(stored.ssl_status, SslStatus::Active);
        let cert = stored.ssl_cert.expect("certificate info stamped");
        assert!(cert.expires_within_days(90));
        assert!(!cert.expires_within_days(60));
        assert_eq!(f.issuer.issued(), vec!["duka.vumashops.com".to_string()]);
    }

    #[tokio::test]
    async fn issuance_success_writes_the_https_vhost() {
        let f = fixture();
        let tenant = f.saved_tenant("duka.vumashops.com").await;
        f.point_dns_at_platform("duka.vumashops.com");

        f.manager.issue_certificate(&tenant.id).await.unwrap();

        let vhost = f.vhost_contents("duka.vumashops.com");
        assert!(vhost.contains("listen 443"));
        assert!(vhost.contains("/etc/letsencrypt/live/duka.vumashops.com/fullchain.pem"));
        assert!(f
            .sites_enabled
            .join("duka.vumashops.com.conf")
            .symlink_metadata()
            .is_ok());
    }

    #[tokio::test]
    async fn dns_mismatch_lands_failed_without_invoking_the_issuer() {
        let f = fixture();
        let tenant = f.saved_tenant("duka.vumashops.com").await;
        f.resolver
            .set_a("duka.vumashops.com", vec![Ipv4Addr::new(203, 0, 113, 9)]);

        let error = f.manager.issue_certificate(&tenant.id).await.unwrap_err();
        assert!(matches!(error, SslError::DomainNotVerified { .. }));

        let stored = f.stored(&tenant.id).await;
        assert_eq!(stored.ssl_status, SslStatus::Failed);
        assert!(f.issuer.issued().is_empty());
    }

    #[tokio::test]
    async fn dns_infrastructure_error_lands_failed() {
        let f = fixture();
        let tenant = f.saved_tenant("duka.vumashops.com").await;
        f.resolver.set_error(DnsError::Timeout {
            hostname: "duka.vumashops.com".to_string(),
        });

        let error = f.manager.issue_certificate(&tenant.id).await.unwrap_err();
        assert!(matches!(error, SslError::Dns(_)));
        assert_eq!(f.stored(&tenant.id).await.ssl_status, SslStatus::Failed);
    }

    #[tokio::test]
    async fn issuer_failure_lands_failed_and_a_retry_succeeds() {
        let f = fixture();
        let tenant = f.saved_tenant("duka.vumashops.com").await;
        f.point_dns_at_platform("duka.vumashops.com");
        f.issuer
            .fail_next_issue(IssuerError::failed("duka.vumashops.com", "CA unreachable"));

        let error = f.manager.issue_certificate(&tenant.id).await.unwrap_err();
        assert!(matches!(error, SslError::Issuance(_)));
        assert_eq!(f.stored(&tenant.id).await.ssl_status, SslStatus::Failed);

        f.manager.issue_certificate(&tenant.id).await.unwrap();
        assert_eq!(f.stored(&tenant.id).await.ssl_status, SslStatus::Active);
    }

    #[tokio::test]
    async fn active_tenant_cannot_restart_issuance() {
        let f = fixture();
        let tenant = f.saved_tenant("duka.vumashops.com").await;
        f.point_dns_at_platform("duka.vumashops.com");
        f.manager.issue_certificate(&tenant.id).await.unwrap();

        let error = f.manager.issue_certificate(&tenant.id).await.unwrap_err();
        assert!(matches!(error, SslError::Transition(_)));
        assert_eq!(f.issuer.issued().len(), 1);
    }

    #[tokio::test]
    async fn terminated_tenant_is_refused() {
        let f = fixture();
        let mut tenant = f.saved_tenant("duka.vumashops.com").await;
        tenant.terminate().unwrap();
        f.tenants.update(&tenant).await.unwrap();

        let error = f.manager.issue_certificate(&tenant.id).await.unwrap_err();
        assert!(matches!(error, SslError::TenantTerminated(_)));
    }

    #[tokio::test]
    async fn unknown_tenant_is_refused() {
        let f = fixture();
        let error = f
            .manager
            .issue_certificate(&TenantId::new())
            .await
            .unwrap_err();
        assert!(matches!(error, SslError::TenantNotFound(_)));
    }

    #[tokio::test]
    async fn tenant_without_an_install_is_refused_before_any_transition() {
        let f = fixture();
        let tenant = Tenant::create(
            "Duka Moja",
            Hostname::new("duka.vumashops.com").unwrap(),
            CountryCode::new("KE").unwrap(),
            CurrencyCode::KES,
        );
        f.tenants.save(&tenant).await.unwrap();

        let error = f.manager.issue_certificate(&tenant.id).await.unwrap_err();
        assert!(matches!(error, SslError::NotInstalled(_)));
        assert_eq!(f.stored(&tenant.id).await.ssl_status, SslStatus::Pending);
    }

    // ════════════════════════════════════════════════════════════════════════
    // HTTP vhost and revocation
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn http_vhost_serves_acme_challenge_without_tls() {
        let f = fixture();
        let tenant = f.saved_tenant("duka.vumashops.com").await;

        f.manager.install_http_vhost(&tenant.id).await.unwrap();

        let vhost = f.vhost_contents("duka.vumashops.com");
        assert!(vhost.contains("/.well-known/acme-challenge/"));
        assert!(!vhost.contains("listen 443"));
    }

    #[tokio::test]
    async fn revoke_returns_to_pending_and_serves_plain_http() {
        let f = fixture();
        let tenant = f.saved_tenant("duka.vumashops.com").await;
        f.point_dns_at_platform("duka.vumashops.com");
        f.manager.issue_certificate(&tenant.id).await.unwrap();

        f.manager.revoke(&tenant.id).await.unwrap();

        let stored = f.stored(&tenant.id).await;
        assert_eq!(stored.ssl_status, SslStatus::Pending);
        assert!(stored.ssl_cert.is_none());
        assert!(!f.vhost_contents("duka.vumashops.com").contains("listen 443"));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Renewal sweep
    // ════════════════════════════════════════════════════════════════════════

    async fn active_tenant_expiring_in(f: &Fixture, host: &str, days: i64) -> Tenant {
        let mut tenant = f.saved_tenant(host).await;
        tenant.begin_ssl_verification().unwrap();
        tenant.begin_ssl_issuance().unwrap();
        tenant
            .mark_ssl_active(SslCertInfo {
                issued_at: Timestamp::now().minus_days(90 - days),
                expires_at: Timestamp::now().plus_days(days),
            })
            .unwrap();
        f.tenants.update(&tenant).await.unwrap();
        tenant
    }

    #[tokio::test]
    async fn renewal_sweep_renews_only_certificates_in_the_window() {
        let f = fixture();
        let due = active_tenant_expiring_in(&f, "due.vumashops.com", 20).await;
        active_tenant_expiring_in(&f, "fresh.vumashops.com", 80).await;
        f.saved_tenant("pending.vumashops.com").await;

        let renewed = f.manager.renew_due().await.unwrap();

        assert_eq!(renewed, 1);
        assert_eq!(f.issuer.renewed(), vec!["due.vumashops.com".to_string()]);
        let stored = f.stored(&due.id).await;
        assert!(!stored.ssl_cert.unwrap().expires_within_days(60));
    }

    #[tokio::test]
    async fn renewal_failure_is_skipped_and_not_counted() {
        let f = fixture();
        active_tenant_expiring_in(&f, "broken.vumashops.com", 10).await;
        active_tenant_expiring_in(&f, "healthy.vumashops.com", 10).await;
        f.issuer.fail_renew(
            "broken.vumashops.com",
            IssuerError::failed("broken.vumashops.com", "challenge unreachable"),
        );

        let renewed = f.manager.renew_due().await.unwrap();

        assert_eq!(renewed, 1);
        assert_eq!(f.issuer.renewed(), vec!["healthy.vumashops.com".to_string()]);
    }
}

//! Store provisioning pipeline.
//!
//! Stands up one merchant store in strict order: tenant database, Bagisto
//! install, optional headless channel, production hardening, then the
//! tenant record and credentials. The first hard failure triggers cleanup
//! (drop the database, remove the tenant path) and the error propagates
//! naming the failed step, so a retry starts from a clean slate. The
//! headless step is the one soft step: a store without it is degraded but
//! usable, so its failure only logs a warning.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};
use rand::{distributions::Alphanumeric, Rng};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::application::locks::TenantLocks;
use crate::domain::foundation::TenantId;
use crate::domain::tenant::Tenant;
use crate::ports::{
    DbAdminError, InstallError, InstallSpec, SecretStore, SecretStoreError, StoreError,
    StoreInstaller, TenantDatabase, TenantStore,
};

/// Settings key for the tenant database name.
pub const DB_NAME_KEY: &str = "db_name";

/// Settings key for the tenant database user.
pub const DB_USER_KEY: &str = "db_user";

/// Settings key for the sealed tenant database password.
pub const DB_PASSWORD_KEY: &str = "db_password_sealed";

const ADMIN_PASSWORD_LENGTH: usize = 16;
const DB_PASSWORD_LENGTH: usize = 32;

/// Errors from the provisioning pipeline, naming the step that failed.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// No tenant with the given id.
    #[error("tenant '{0}' not found")]
    TenantNotFound(TenantId),

    /// The tenant has been terminated.
    #[error("tenant '{0}' is terminated")]
    TenantTerminated(TenantId),

    /// The tenant already has a completed installation.
    #[error("tenant '{0}' already has an installed store")]
    AlreadyProvisioned(TenantId),

    /// Step 1 failed. Nothing was created, so nothing is cleaned up.
    #[error("Database creation failed: {0}")]
    DatabaseCreation(#[source] DbAdminError),

    /// Step 2 failed.
    #[error("Bagisto installation failed: {0}")]
    Installation(#[source] InstallError),

    /// Step 4 failed.
    #[error("Production hardening failed: {0}")]
    Hardening(#[source] InstallError),

    /// The admin password could not be hashed.
    #[error("Admin credential hashing failed: {0}")]
    CredentialHashing(String),

    /// The database password could not be sealed for storage.
    #[error("Database credential sealing failed: {0}")]
    CredentialSealing(#[source] SecretStoreError),

    /// Step 5 failed.
    #[error("Tenant record update failed: {0}")]
    RecordUpdate(#[source] StoreError),

    /// Loading the tenant failed before the pipeline started.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a completed provisioning run hands back to the caller.
///
/// `admin_password` is the only place the generated password exists in the
/// clear; the tenant record keeps an argon2 hash. The billing system
/// delivers it to the merchant once.
#[derive(Debug, Clone)]
pub struct ProvisionReceipt {
    pub tenant_id: TenantId,
    pub store_url: String,
    pub admin_email: String,
    pub admin_password: SecretString,
    pub installed_version: String,
    pub install_path: PathBuf,
}

/// Orchestrates the provisioning pipeline for one tenant.
///
/// Holds the tenant's lock for the whole run, so a duplicate trigger for
/// the same tenant waits and then fails the already-provisioned guard
/// instead of racing the installer.
pub struct BagistoProvisioner {
    tenants: Arc<dyn TenantStore>,
    database: Arc<dyn TenantDatabase>,
    installer: Arc<dyn StoreInstaller>,
    secrets: Arc<dyn SecretStore>,
    locks: TenantLocks,
    tenants_root: PathBuf,
}

impl BagistoProvisioner {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        database: Arc<dyn TenantDatabase>,
        installer: Arc<dyn StoreInstaller>,
        secrets: Arc<dyn SecretStore>,
        locks: TenantLocks,
        tenants_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tenants,
            database,
            installer,
            secrets,
            locks,
            tenants_root: tenants_root.into(),
        }
    }

    /// Database name for a tenant, stable across retries.
    pub fn db_name(tenant_id: &TenantId) -> String {
        format!("vumashops_{}", tenant_id.simple())
    }

    /// Database user for a tenant. MySQL caps user names at 32 chars.
    pub fn db_user(tenant_id: &TenantId) -> String {
        format!("vs_{}", &tenant_id.simple()[..24])
    }

    /// Filesystem root the tenant's store is installed into.
    pub fn install_path(&self, tenant_id: &TenantId) -> PathBuf {
        self.tenants_root.join(tenant_id.simple())
    }

    /// Runs the full pipeline and returns the receipt for the billing system.
    ///
    /// A tenant whose previous run failed has no footprint left (cleanup
    /// removed it), so calling again retries from scratch. A tenant with a
    /// completed installation is refused.
    pub async fn provision(
        &self,
        tenant_id: &TenantId,
        admin_email: &str,
    ) -> Result<ProvisionReceipt, ProvisioningError> {
        let lock = self.locks.for_tenant(*tenant_id);
        let _guard = lock.lock().await;

        let mut tenant = self
            .tenants
            .find_by_id(tenant_id)
            .await?
            .ok_or(ProvisioningError::TenantNotFound(*tenant_id))?;
        if tenant.is_deleted() {
            return Err(ProvisioningError::TenantTerminated(*tenant_id));
        }
        if tenant.installed_at.is_some() {
            return Err(ProvisioningError::AlreadyProvisioned(*tenant_id));
        }

        let db_name = Self::db_name(&tenant.id);
        let db_user = Self::db_user(&tenant.id);
        let db_password = generate_password(DB_PASSWORD_LENGTH);
        let admin_password = generate_password(ADMIN_PASSWORD_LENGTH);
        let path = self.install_path(&tenant.id);
        let store_url = format!("https://{}", tenant.primary_domain);

        info!(tenant_id = %tenant.id, hostname = %tenant.primary_domain, "provisioning store");

        // Step 1: tenant database. Idempotent at the port, so an
        // interrupted run can pass through here again.
        self.database
            .create(&db_name, &db_user, &db_password)
            .await
            .map_err(ProvisioningError::DatabaseCreation)?;

        // Step 2: Bagisto install.
        let spec = InstallSpec {
            tenant_id: tenant.id,
            path: path.clone(),
            app_url: store_url.clone(),
            db_name: db_name.clone(),
            db_user: db_user.clone(),
            db_password: db_password.clone(),
            locale: tenant.locale.clone(),
            timezone: tenant.timezone.clone(),
            currency: tenant.currency,
            admin_email: admin_email.to_string(),
            admin_password: admin_password.clone(),
        };
        let report = match self.installer.install(&spec).await {
            Ok(report) => report,
            Err(install_error) => {
                self.cleanup(&tenant.id, &db_name, &db_user, &path).await;
                return Err(ProvisioningError::Installation(install_error));
            }
        };

        // Step 3: headless channel, best-effort.
        if let Err(install_error) = self.installer.configure_headless(&path).await {
            warn!(
                tenant_id = %tenant.id,
                error = %install_error,
                "headless channel setup failed, store continues without it"
            );
        }

        // Step 4: production hardening.
        if let Err(install_error) = self.installer.harden(&path).await {
            self.cleanup(&tenant.id, &db_name, &db_user, &path).await;
            return Err(ProvisioningError::Hardening(install_error));
        }

        // Step 5: tenant record and credentials, one atomic update.
        let password_hash = match hash_admin_password(&admin_password) {
            Ok(hash) => hash,
            Err(provisioning_error) => {
                self.cleanup(&tenant.id, &db_name, &db_user, &path).await;
                return Err(provisioning_error);
            }
        };
        let sealed_db_password = match self.secrets.seal(&db_password) {
            Ok(sealed) => sealed,
            Err(seal_error) => {
                self.cleanup(&tenant.id, &db_name, &db_user, &path).await;
                return Err(ProvisioningError::CredentialSealing(seal_error));
            }
        };

        tenant.record_install(path.clone(), report.version.clone());
        tenant.set_admin_credential(admin_email, password_hash);
        tenant.settings.insert(DB_NAME_KEY.to_string(), db_name.clone());
        tenant.settings.insert(DB_USER_KEY.to_string(), db_user.clone());
        tenant
            .settings
            .insert(DB_PASSWORD_KEY.to_string(), sealed_db_password);

        if let Err(store_error) = self.tenants.update(&tenant).await {
            self.cleanup(&tenant.id, &db_name, &db_user, &path).await;
            return Err(ProvisioningError::RecordUpdate(store_error));
        }

        info!(
            tenant_id = %tenant.id,
            path = %path.display(),
            version = %report.version,
            "store provisioned"
        );

        Ok(ProvisionReceipt {
            tenant_id: tenant.id,
            store_url,
            admin_email: admin_email.to_string(),
            admin_password,
            installed_version: report.version,
            install_path: path,
        })
    }

    /// Tears down whatever the failed run created. Errors here are only
    /// logged; the caller needs to see the original failure.
    async fn cleanup(&self, tenant_id: &TenantId, db_name: &str, db_user: &str, path: &Path) {
        warn!(tenant_id = %tenant_id, "provisioning failed, cleaning up partial install");
        if let Err(db_error) = TenantDatabase::drop(self.database.as_ref(), db_name, db_user).await {
            error!(tenant_id = %tenant_id, error = %db_error, "cleanup could not drop the tenant database");
        }
        if let Err(install_error) = self.installer.remove(path).await {
            error!(tenant_id = %tenant_id, error = %install_error, "cleanup could not remove the tenant path");
        }
    }
}

/// Random alphanumeric password. Alphanumeric keeps it safe to pass
/// through the installer's environment and seed commands.
fn generate_password(length: usize) -> SecretString {
    let password: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    SecretString::new(password)
}

/// Argon2id PHC hash of the one-time admin password.
fn hash_admin_password(password: &SecretString) -> Result<String, ProvisioningError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ProvisioningError::CredentialHashing(e.to_string()))
}

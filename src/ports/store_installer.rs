//! Store installer port.
//!
//! Abstracts the storefront installation steps that touch the app server:
//! laying down the application, running its migrations, optional headless
//! channel setup, and production hardening. The certbot-style subprocess
//! work lives in the adapter; the pipeline sees only these operations.

use async_trait::async_trait;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::foundation::{CurrencyCode, TenantId};

/// Everything the installer needs to stand up one store.
#[derive(Debug, Clone)]
pub struct InstallSpec {
    /// Tenant being installed.
    pub tenant_id: TenantId,

    /// Filesystem root the store is installed into.
    pub path: PathBuf,

    /// Public URL of the store, e.g. `https://shop.vumashops.com`.
    pub app_url: String,

    /// Database the store connects to.
    pub db_name: String,

    /// Database user the store connects as.
    pub db_user: String,

    /// Database password.
    pub db_password: SecretString,

    /// Default storefront locale.
    pub locale: String,

    /// Storefront timezone.
    pub timezone: String,

    /// Store currency.
    pub currency: CurrencyCode,

    /// Admin login email.
    pub admin_email: String,

    /// Admin login password, generated for this install.
    pub admin_password: SecretString,
}

/// What a completed installation reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Version of the storefront that was installed.
    pub version: String,
}

/// Port for installing and removing storefront instances.
#[async_trait]
pub trait StoreInstaller: Send + Sync {
    /// Install the storefront: application files, environment file,
    /// migrations, and seed data.
    async fn install(&self, spec: &InstallSpec) -> Result<InstallReport, InstallError>;

    /// Configure the headless API channel.
    ///
    /// Best-effort by contract: callers log failures and continue, a store
    /// without the headless channel is degraded but usable.
    async fn configure_headless(&self, path: &Path) -> Result<(), InstallError>;

    /// Production hardening: caches warmed, storage linked, permissions set.
    async fn harden(&self, path: &Path) -> Result<(), InstallError>;

    /// Remove an installed (or partially installed) store from disk.
    ///
    /// Absence is not an error; cleanup must be re-runnable.
    async fn remove(&self, path: &Path) -> Result<(), InstallError>;
}

/// Errors from store installation.
#[derive(Debug, Clone, Error)]
pub enum InstallError {
    /// A required tool (composer, php, artisan) is missing.
    #[error("Installer tooling unavailable: {0}")]
    ToolUnavailable(String),

    /// An installation command failed.
    #[error("Install step '{step}' failed: {detail}")]
    StepFailed { step: String, detail: String },

    /// Filesystem manipulation failed.
    #[error("Filesystem error at {path}: {detail}")]
    Filesystem { path: String, detail: String },

    /// A command did not finish in time.
    #[error("Install step '{step}' timed out after {seconds}s")]
    Timeout { step: String, seconds: u64 },
}

impl InstallError {
    /// Create a step failure.
    pub fn step_failed(step: impl Into<String>, detail: impl Into<String>) -> Self {
        InstallError::StepFailed {
            step: step.into(),
            detail: detail.into(),
        }
    }

    /// Create a filesystem error.
    pub fn filesystem(path: impl Into<String>, detail: impl Into<String>) -> Self {
        InstallError::Filesystem {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

//! Certbot-backed certificate issuer.
//!
//! Drives the certbot CLI in webroot mode: the HTTP-01 challenge file is
//! served out of the ACME webroot that every generated nginx vhost exposes.
//! Certbot must be installed on the host; availability is probed before any
//! issuance attempt so a missing install surfaces as a clear error instead
//! of a confusing subprocess failure.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::foundation::Timestamp;
use crate::ports::{CertificateIssuer, IssuedCertificate, IssuerError};

/// Let's Encrypt certificates are valid for 90 days.
const CERT_LIFETIME_DAYS: i64 = 90;

/// Certificate issuer shelling out to certbot.
#[derive(Debug, Clone)]
pub struct CertbotIssuer {
    /// Path to the certbot executable. If None, will search PATH.
    certbot_path: Option<String>,

    /// Contact email registered with the CA.
    contact_email: String,

    /// Where certbot writes live certificates.
    live_dir: PathBuf,

    /// Timeout for one certbot run in seconds.
    timeout_secs: u64,

    /// Order against the staging CA instead of production.
    staging: bool,
}

impl CertbotIssuer {
    /// Create an issuer with default settings.
    pub fn new(contact_email: impl Into<String>) -> Self {
        Self {
            certbot_path: None,
            contact_email: contact_email.into(),
            live_dir: PathBuf::from("/etc/letsencrypt/live"),
            timeout_secs: 180,
            staging: false,
        }
    }

    /// Set a custom path to the certbot executable.
    pub fn with_certbot_path(mut self, path: impl Into<String>) -> Self {
        self.certbot_path = Some(path.into());
        self
    }

    /// Set where live certificates are written.
    pub fn with_live_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.live_dir = dir.into();
        self
    }

    /// Set the timeout for one certbot run.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Order against the Let's Encrypt staging CA.
    pub fn staging(mut self) -> Self {
        self.staging = true;
        self
    }

    /// Get the certbot command path.
    fn certbot_command(&self) -> &str {
        self.certbot_path.as_deref().unwrap_or("certbot")
    }

    /// Where certbot puts the live PEMs for a hostname.
    fn certificate_for(&self, hostname: &str) -> IssuedCertificate {
        let issued_at = Timestamp::now();
        IssuedCertificate {
            cert_path: self.live_dir.join(hostname).join("fullchain.pem"),
            key_path: self.live_dir.join(hostname).join("privkey.pem"),
            issued_at,
            expires_at: issued_at.plus_days(CERT_LIFETIME_DAYS),
        }
    }

    async fn run_certbot(&self, hostname: &str, args: Vec<String>) -> Result<(), IssuerError> {
        if !self.is_available().await {
            return Err(IssuerError::ToolUnavailable(format!(
                "'{}' is not installed or not executable",
                self.certbot_command()
            )));
        }

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            Command::new(self.certbot_command())
                .args(&args)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| IssuerError::Timeout {
            hostname: hostname.to_string(),
            seconds: self.timeout_secs,
        })?
        .map_err(|e| IssuerError::failed(hostname, format!("failed to start certbot: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(hostname = %hostname, "certbot failed: {}", stderr.trim());
            return Err(IssuerError::failed(hostname, stderr.trim().to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl CertificateIssuer for CertbotIssuer {
    async fn issue(
        &self,
        hostname: &str,
        webroot: &PathBuf,
    ) -> Result<IssuedCertificate, IssuerError> {
        let mut args = vec![
            "certonly".to_string(),
            "--webroot".to_string(),
            "-w".to_string(),
            webroot.display().to_string(),
            "-d".to_string(),
            hostname.to_string(),
            "--non-interactive".to_string(),
            "--agree-tos".to_string(),
            "-m".to_string(),
            self.contact_email.clone(),
            // Re-running for a hostname that already has a live
            // certificate must not burn a rate-limited order.
            "--keep-until-expiring".to_string(),
        ];
        if self.staging {
            args.push("--staging".to_string());
        }

        self.run_certbot(hostname, args).await?;

        tracing::info!(hostname = %hostname, "certificate issued");
        Ok(self.certificate_for(hostname))
    }

    async fn renew(&self, hostname: &str) -> Result<IssuedCertificate, IssuerError> {
        let args = vec![
            "renew".to_string(),
            "--cert-name".to_string(),
            hostname.to_string(),
            "--non-interactive".to_string(),
        ];

        self.run_certbot(hostname, args).await?;

        tracing::info!(hostname = %hostname, "certificate renewed");
        Ok(self.certificate_for(hostname))
    }

    async fn is_available(&self) -> bool {
        let output = Command::new(self.certbot_command())
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await;

        output.map(|o| o.status.success()).unwrap_or(false)
    }
}

/// [`CertificateIssuer`] handing out fixed certbot-layout paths, for tests.
///
/// Records every issuance and renewal. `fail_next_issue` scripts one
/// issuance failure, consumed by the next call; `fail_renew` scripts a
/// failure for one hostname.
#[derive(Debug, Default)]
pub struct StaticCertificateIssuer {
    issue_error: std::sync::Mutex<Option<IssuerError>>,
    renew_errors: std::sync::Mutex<std::collections::HashMap<String, IssuerError>>,
    issued: std::sync::Mutex<Vec<String>>,
    renewed: std::sync::Mutex<Vec<String>>,
}

impl StaticCertificateIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next issuance with this error.
    pub fn fail_next_issue(&self, error: IssuerError) {
        *self.issue_error.lock().unwrap() = Some(error);
    }

    /// Fail the next renewal for this hostname.
    pub fn fail_renew(&self, hostname: &str, error: IssuerError) {
        self.renew_errors
            .lock()
            .unwrap()
            .insert(hostname.to_string(), error);
    }

    /// Hostnames issued so far, in order.
    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }

    /// Hostnames renewed so far, in order.
    pub fn renewed(&self) -> Vec<String> {
        self.renewed.lock().unwrap().clone()
    }

    fn certificate_for(hostname: &str) -> IssuedCertificate {
        let live = PathBuf::from("/etc/letsencrypt/live").join(hostname);
        let issued_at = Timestamp::now();
        IssuedCertificate {
            cert_path: live.join("fullchain.pem"),
            key_path: live.join("privkey.pem"),
            issued_at,
            expires_at: issued_at.plus_days(CERT_LIFETIME_DAYS),
        }
    }
}

#[async_trait]
impl CertificateIssuer for StaticCertificateIssuer {
    async fn issue(
        &self,
        hostname: &str,
        _webroot: &PathBuf,
    ) -> Result<IssuedCertificate, IssuerError> {
        if let Some(error) = self.issue_error.lock().unwrap().take() {
            return Err(error);
        }
        self.issued.lock().unwrap().push(hostname.to_string());
        Ok(Self::certificate_for(hostname))
    }

    async fn renew(&self, hostname: &str) -> Result<IssuedCertificate, IssuerError> {
        if let Some(error) = self.renew_errors.lock().unwrap().remove(hostname) {
            return Err(error);
        }
        self.renewed.lock().unwrap().push(hostname.to_string());
        Ok(Self::certificate_for(hostname))
    }

    async fn is_available(&self) -> bool {
        true
    }
}

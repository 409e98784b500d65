//! Certificate issuer port.
//!
//! Wraps ACME issuance (certbot in production) behind a trait so the SSL
//! pipeline can be driven end to end in tests.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::foundation::Timestamp;

/// A certificate that was issued or renewed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    /// Full chain PEM location.
    pub cert_path: PathBuf,

    /// Private key PEM location.
    pub key_path: PathBuf,

    /// When the certificate became valid.
    pub issued_at: Timestamp,

    /// When the certificate expires.
    pub expires_at: Timestamp,
}

/// Port for obtaining TLS certificates.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Obtain a certificate for the hostname using an HTTP-01 challenge
    /// served from `webroot`.
    async fn issue(&self, hostname: &str, webroot: &PathBuf)
        -> Result<IssuedCertificate, IssuerError>;

    /// Renew the existing certificate for the hostname.
    async fn renew(&self, hostname: &str) -> Result<IssuedCertificate, IssuerError>;

    /// Check that the underlying tooling is installed and runnable.
    async fn is_available(&self) -> bool;
}

/// Errors from certificate issuance.
#[derive(Debug, Clone, Error)]
pub enum IssuerError {
    /// The ACME tooling is not installed or not executable.
    #[error("Certificate tooling unavailable: {0}")]
    ToolUnavailable(String),

    /// The CA rejected the order or the challenge failed.
    #[error("Issuance failed for {hostname}: {detail}")]
    IssuanceFailed { hostname: String, detail: String },

    /// The tool did not finish in time.
    #[error("Issuance for {hostname} timed out after {seconds}s")]
    Timeout { hostname: String, seconds: u64 },
}

impl IssuerError {
    /// Create an issuance failure.
    pub fn failed(hostname: impl Into<String>, detail: impl Into<String>) -> Self {
        IssuerError::IssuanceFailed {
            hostname: hostname.into(),
            detail: detail.into(),
        }
    }
}

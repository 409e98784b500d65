//! Secret store port.
//!
//! Credentials that must be persisted (gateway keys entered by merchants,
//! tenant database passwords) pass through this seam. Values are sealed
//! into an opaque string for storage and only opened on explicit request;
//! nothing decrypts implicitly on read.

use secrecy::SecretString;
use thiserror::Error;

/// Port for sealing secrets at rest.
pub trait SecretStore: Send + Sync {
    /// Seal a secret into a storable string.
    fn seal(&self, secret: &SecretString) -> Result<String, SecretStoreError>;

    /// Open a previously sealed string.
    fn open(&self, sealed: &str) -> Result<SecretString, SecretStoreError>;
}

/// Errors from sealing and opening secrets.
#[derive(Debug, Clone, Error)]
pub enum SecretStoreError {
    /// The sealed value is malformed or was sealed under a different key.
    #[error("Sealed value could not be opened: {0}")]
    OpenFailed(String),

    /// Sealing failed.
    #[error("Sealing failed: {0}")]
    SealFailed(String),

    /// The configured master key is unusable.
    #[error("Master key rejected: {0}")]
    BadKey(String),
}

//! Secrets configuration
//!
//! Holds the master key that seals tenant credentials at rest. The key is
//! a base64 encoding of exactly 32 bytes, suitable for AES-256-GCM.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Configuration for credential sealing
#[derive(Debug, Clone, Deserialize)]
pub struct SecretsConfig {
    /// Base64-encoded 32-byte master key
    pub master_key: SecretString,
}

impl SecretsConfig {
    /// Validate secrets configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let encoded = self.master_key.expose_secret();
        if encoded.is_empty() {
            return Err(ValidationError::MissingRequired("SECRETS_MASTER_KEY"));
        }
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|_| ValidationError::InvalidMasterKey)?;
        if decoded.len() != 32 {
            return Err(ValidationError::InvalidMasterKey);
        }
        Ok(())
    }
}

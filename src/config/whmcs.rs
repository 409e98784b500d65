//! WHMCS integration configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Configuration for the WHMCS billing callback surface
#[derive(Debug, Clone, Deserialize)]
pub struct WhmcsConfig {
    /// Shared key WHMCS presents on every module call
    pub api_key: SecretString,
}

impl WhmcsConfig {
    /// Validate WHMCS configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let key = self.api_key.expose_secret();
        if key.is_empty() {
            return Err(ValidationError::MissingRequired("WHMCS_API_KEY"));
        }
        if key.len() < 32 {
            return Err(ValidationError::ApiKeyTooShort);
        }
        Ok(())
    }
}

//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format (expected mysql://)")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Server IP is not a valid IPv4 address")]
    InvalidServerIp,

    #[error("Base domain must be a bare hostname like vumashops.com")]
    InvalidBaseDomain,

    #[error("ACME contact email is not a valid address")]
    InvalidContactEmail,

    #[error("Secrets master key must be base64 for exactly 32 bytes")]
    InvalidMasterKey,

    #[error("WHMCS API key must be at least 32 characters")]
    ApiKeyTooShort,

    #[error("Unknown currency code for {0}")]
    UnknownCurrency(&'static str),
}

//! Tenant database administration port.
//!
//! Each store gets its own MySQL database and user. This port covers only
//! the administrative statements provisioning needs; the store application
//! owns its own schema once installed.

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

/// Port for creating and dropping per-tenant databases.
#[async_trait]
pub trait TenantDatabase: Send + Sync {
    /// Create a database and a user with full rights on it.
    ///
    /// Must be idempotent: re-running for an existing database and user is
    /// not an error, so interrupted provisioning can retry.
    async fn create(
        &self,
        db_name: &str,
        db_user: &str,
        password: &SecretString,
    ) -> Result<(), DbAdminError>;

    /// Drop the database and user if they exist.
    ///
    /// Used by provisioning cleanup; absence is not an error.
    async fn drop(&self, db_name: &str, db_user: &str) -> Result<(), DbAdminError>;

    /// True when the database exists.
    async fn exists(&self, db_name: &str) -> Result<bool, DbAdminError>;
}

/// Errors from database administration.
#[derive(Debug, Clone, Error)]
pub enum DbAdminError {
    /// The identifier is not safe to interpolate into DDL.
    #[error("Invalid database identifier '{0}'")]
    InvalidIdentifier(String),

    /// The server rejected or failed the statement.
    #[error("Database administration failed: {0}")]
    Execution(String),
}

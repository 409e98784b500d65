//! DNS resolver port.
//!
//! Domain verification needs A and TXT lookups. Keeping resolution behind a
//! port lets the pipeline run against a stub in tests and keeps the choice
//! of resolver library out of the application layer.

use async_trait::async_trait;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Port for the DNS lookups domain verification depends on.
///
/// # Contract
///
/// A name that resolves to no records of the requested type yields an empty
/// vector, not an error. Errors are reserved for infrastructure failures
/// where the answer is unknowable (timeouts, servfail).
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// IPv4 addresses the hostname resolves to.
    async fn lookup_a(&self, hostname: &str) -> Result<Vec<Ipv4Addr>, DnsError>;

    /// TXT record strings published on the hostname.
    async fn lookup_txt(&self, hostname: &str) -> Result<Vec<String>, DnsError>;
}

/// Errors from DNS resolution.
#[derive(Debug, Clone, Error)]
pub enum DnsError {
    /// The resolver could not produce an answer.
    #[error("DNS resolution failed for {hostname}: {message}")]
    Resolution { hostname: String, message: String },

    /// The query did not complete in time.
    #[error("DNS query for {hostname} timed out")]
    Timeout { hostname: String },
}

impl DnsError {
    /// Create a resolution error.
    pub fn resolution(hostname: impl Into<String>, message: impl Into<String>) -> Self {
        DnsError::Resolution {
            hostname: hostname.into(),
            message: message.into(),
        }
    }
}

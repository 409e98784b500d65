//! Domain ownership verification.
//!
//! Before a certificate is requested for a merchant domain, the domain has
//! to demonstrably point at this platform. Two proofs are accepted: an A
//! record resolving to the platform server address, or a TXT record carrying
//! the tenant's verification token. Either one passes.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::ports::{DnsError, DnsResolver};

/// TXT record prefix merchants publish to prove domain ownership.
pub const TXT_RECORD_PREFIX: &str = "vumashops-verification";

/// The exact TXT record value expected for a verification token.
pub fn expected_txt_record(token: &str) -> String {
    format!("{TXT_RECORD_PREFIX}={token}")
}

/// How a domain proved (or failed to prove) it points at the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainVerification {
    /// An A record resolved to the platform server address.
    ARecord(Ipv4Addr),
    /// A TXT record carried the expected verification token.
    TxtRecord,
    /// Lookups succeeded but neither proof was found.
    Unverified,
}

impl DomainVerification {
    /// True when either proof was found.
    pub fn is_verified(&self) -> bool {
        !matches!(self, DomainVerification::Unverified)
    }
}

/// Checks that a merchant domain points at the platform.
///
/// An A lookup runs first since it is the common case for live stores. When
/// the A records do not match, the TXT token is tried as the fallback proof,
/// which lets merchants verify a domain before repointing traffic.
pub struct DnsVerifier {
    resolver: Arc<dyn DnsResolver>,
    server_ip: Ipv4Addr,
}

impl DnsVerifier {
    pub fn new(resolver: Arc<dyn DnsResolver>, server_ip: Ipv4Addr) -> Self {
        Self {
            resolver,
            server_ip,
        }
    }

    /// Verifies `hostname` against the platform address and `token`.
    ///
    /// A failed A lookup is not fatal on its own: the TXT proof may still
    /// succeed, and a merchant mid-migration often has unstable A records.
    /// The A error is only surfaced when the TXT lookup produced no proof
    /// either, so the caller sees the infrastructure failure rather than a
    /// misleading `Unverified`.
    pub async fn verify(
        &self,
        hostname: &str,
        token: &str,
    ) -> Result<DomainVerification, DnsError> {
        let a_error = match self.resolver.lookup_a(hostname).await {
            Ok(addresses) => {
                if addresses.contains(&self.server_ip) {
                    debug!(hostname, address = %self.server_ip, "domain verified by A record");
                    return Ok(DomainVerification::ARecord(self.server_ip));
                }
                None
            }
            Err(error) => {
                warn!(hostname, %error, "A lookup failed, falling back to TXT proof");
                Some(error)
            }
        };

        let expected = expected_txt_record(token);
        let records = match self.resolver.lookup_txt(hostname).await {
            Ok(records) => records,
            Err(error) => return Err(a_error.unwrap_or(error)),
        };

        if records.iter().any(|record| record.trim() == expected) {
            debug!(hostname, "domain verified by TXT record");
            return Ok(DomainVerification::TxtRecord);
        }

        match a_error {
            Some(error) => Err(error),
            None => Ok(DomainVerification::Unverified),
        }
    }
}

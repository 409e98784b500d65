//! DNS resolver adapters.
//!
//! `HickoryDnsResolver` is the production resolver. `StaticDnsResolver` is
//! a configurable stand-in so verification and the SSL pipeline can run in
//! tests without touching the network.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;

use crate::ports::{DnsError, DnsResolver};

/// Production DNS resolver backed by hickory.
pub struct HickoryDnsResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryDnsResolver {
    /// Resolver using the host's `/etc/resolv.conf`.
    pub fn from_system_conf() -> Result<Self, DnsError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| DnsError::resolution("system resolver", e.to_string()))?;
        Ok(Self { resolver })
    }

    /// Resolver using well-known public nameservers. Used when the host's
    /// resolver points at a local cache that hides fresh delegations.
    pub fn with_public_nameservers() -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(
                ResolverConfig::default(),
                ResolverOpts::default(),
            ),
        }
    }

    fn map_error(hostname: &str, error: hickory_resolver::error::ResolveError) -> DnsError {
        match error.kind() {
            ResolveErrorKind::Timeout => DnsError::Timeout {
                hostname: hostname.to_string(),
            },
            _ => DnsError::resolution(hostname, error.to_string()),
        }
    }
}

#[async_trait]
impl DnsResolver for HickoryDnsResolver {
    async fn lookup_a(&self, hostname: &str) -> Result<Vec<Ipv4Addr>, DnsError> {
        match self.resolver.ipv4_lookup(hostname).await {
            Ok(lookup) => Ok(lookup.iter().map(|record| record.0).collect()),
            // No records is an answer, not a failure.
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(vec![]),
            Err(e) => Err(Self::map_error(hostname, e)),
        }
    }

    async fn lookup_txt(&self, hostname: &str) -> Result<Vec<String>, DnsError> {
        match self.resolver.txt_lookup(hostname).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|txt| {
                    // Long TXT values arrive split into segments; the
                    // published string is their concatenation.
                    txt.txt_data()
                        .iter()
                        .map(|segment| String::from_utf8_lossy(segment).into_owned())
                        .collect::<String>()
                })
                .collect()),
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(vec![]),
            Err(e) => Err(Self::map_error(hostname, e)),
        }
    }
}

/// In-memory resolver for tests.
///
/// Hostnames resolve to whatever was registered; everything else resolves
/// to nothing. An injected error is returned once.
#[derive(Default)]
pub struct StaticDnsResolver {
    a_records: Mutex<HashMap<String, Vec<Ipv4Addr>>>,
    txt_records: Mutex<HashMap<String, Vec<String>>>,
    next_error: Mutex<Option<DnsError>>,
}

impl StaticDnsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register A records for a hostname.
    pub fn set_a(&self, hostname: &str, addresses: Vec<Ipv4Addr>) {
        self.a_records
            .lock()
            .unwrap()
            .insert(hostname.to_ascii_lowercase(), addresses);
    }

    /// Register TXT records for a hostname.
    pub fn set_txt(&self, hostname: &str, values: Vec<String>) {
        self.txt_records
            .lock()
            .unwrap()
            .insert(hostname.to_ascii_lowercase(), values);
    }

    /// Fail the next lookup with this error.
    pub fn set_error(&self, error: DnsError) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    fn take_error(&self) -> Option<DnsError> {
        self.next_error.lock().unwrap().take()
    }
}

#[async_trait]
impl DnsResolver for StaticDnsResolver {
    async fn lookup_a(&self, hostname: &str) -> Result<Vec<Ipv4Addr>, DnsError> {
        if let Some(error) = self.take_error() {
            return Err(error);
        }
        Ok(self
            .a_records
            .lock()
            .unwrap()
            .get(&hostname.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn lookup_txt(&self, hostname: &str) -> Result<Vec<String>, DnsError> {
        if let Some(error) = self.take_error() {
            return Err(error);
        }
        Ok(self
            .txt_records
            .lock()
            .unwrap()
            .get(&hostname.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_resolver_returns_registered_a_records() {
        let resolver = StaticDnsResolver::new();
        resolver.set_a("shop.example.com", vec![Ipv4Addr::new(102, 130, 118, 7)]);

        let addresses = resolver.lookup_a("shop.example.com").await.unwrap();
        assert_eq!(addresses, vec![Ipv4Addr::new(102, 130, 118, 7)]);
    }

    #[tokio::test]
    async fn static_resolver_is_case_insensitive() {
        let resolver = StaticDnsResolver::new();
        resolver.set_a("Shop.Example.COM", vec![Ipv4Addr::new(102, 130, 118, 7)]);

        let addresses = resolver.lookup_a("shop.example.com").await.unwrap();
        assert_eq!(addresses.len(), 1);
    }

    #[tokio::test]
    async fn unregistered_hostname_resolves_to_nothing() {
        let resolver = StaticDnsResolver::new();

        assert!(resolver.lookup_a("unknown.example.com").await.unwrap().is_empty());
        assert!(resolver.lookup_txt("unknown.example.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_error_fails_one_lookup() {
        let resolver = StaticDnsResolver::new();
        resolver.set_a("shop.example.com", vec![Ipv4Addr::new(102, 130, 118, 7)]);
        resolver.set_error(DnsError::Timeout {
            hostname: "shop.example.com".to_string(),
        });

        assert!(resolver.lookup_a("shop.example.com").await.is_err());
        assert!(resolver.lookup_a("shop.example.com").await.is_ok());
    }
}

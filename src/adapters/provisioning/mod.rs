//! Provisioning adapters.
//!
//! Everything that touches the machines a store runs on: DNS lookups for
//! domain verification, certbot for certificates, the Bagisto installer,
//! nginx vhost management, and per-tenant MySQL administration.

mod bagisto;
mod certbot;
mod database;
mod dns;
mod nginx;

pub use bagisto::{BagistoInstaller, InMemoryStoreInstaller};
pub use certbot::{CertbotIssuer, StaticCertificateIssuer};
pub use database::{InMemoryTenantDatabase, MySqlTenantDatabase};
pub use dns::{HickoryDnsResolver, StaticDnsResolver};
pub use nginx::{NginxConfigGenerator, NginxError, TlsPaths};

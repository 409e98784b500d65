//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Payment Ports
//!
//! - `GatewayDriver` - One implementation per payment provider
//! - `PaymentStore` - Payment aggregate persistence
//! - `OrderTracker` - Settlement reporting back to the storefront
//! - `ReconciliationAlerts` - Operator-visible unmatched webhook events
//!
//! ## Tenant & Provisioning Ports
//!
//! - `TenantStore` / `DomainStore` - Tenant and domain persistence
//! - `DnsResolver` - A/TXT lookups for domain verification
//! - `CertificateIssuer` - ACME certificate issuance and renewal
//! - `TenantDatabase` - Per-tenant database administration
//! - `StoreInstaller` - Storefront installation on the app server
//!
//! ## Cross-cutting Ports
//!
//! - `SecretStore` - Sealing credentials at rest
//! - `NotificationSink` - Merchant/operator notification delivery

mod certificate_issuer;
mod dns;
mod domain_store;
mod gateway;
mod notifications;
mod order_tracker;
mod payment_store;
mod reconciliation;
mod secret_store;
mod store_error;
mod store_installer;
mod tenant_database;
mod tenant_store;

pub use certificate_issuer::{CertificateIssuer, IssuedCertificate, IssuerError};
pub use dns::{DnsError, DnsResolver};
pub use domain_store::DomainStore;
pub use gateway::{
    GatewayDriver, GatewayError, GatewayStatus, InitiateOutcome, InitiateRequest, NextAction,
    RefundOutcome, RefundRequest, VerifyOutcome, VerifyRequest, WebhookDelivery, WebhookOutcome,
};
pub use notifications::{Notification, NotificationSink};
pub use order_tracker::OrderTracker;
pub use payment_store::PaymentStore;
pub use reconciliation::{ReconciliationAlerts, ReconciliationGap};
pub use secret_store::{SecretStore, SecretStoreError};
pub use store_error::StoreError;
pub use store_installer::{InstallError, InstallReport, InstallSpec, StoreInstaller};
pub use tenant_database::{DbAdminError, TenantDatabase};
pub use tenant_store::TenantStore;

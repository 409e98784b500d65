//! Application layer.
//!
//! Orchestration over the domain and the ports: payment routing, the
//! provisioning pipeline, certificate management, and the WHMCS-facing
//! lifecycle service. Everything here is adapter-agnostic; wiring happens
//! in `main`.

pub mod dns_verifier;
pub mod locks;
pub mod payment_manager;
pub mod provisioner;
pub mod ssl_manager;
pub mod whmcs;

pub use dns_verifier::{DnsVerifier, DomainVerification};
pub use locks::TenantLocks;
pub use payment_manager::{
    CheckoutRequest, InitiatedPayment, PaymentManager, RefundResult, VerificationResult,
    WebhookAck,
};
pub use provisioner::{BagistoProvisioner, ProvisionReceipt, ProvisioningError};
pub use ssl_manager::{SslError, SslManager};
pub use whmcs::{CreateStoreRequest, CreatedStore, StatusReport, WhmcsError, WhmcsService};

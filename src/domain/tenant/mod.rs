//! Tenant domain module.
//!
//! Handles the merchant store lifecycle: billing status, domains, the
//! certificate pipeline, and the installation footprint.
//!
//! # Module Structure
//!
//! - `tenant` - Tenant aggregate entity
//! - `domain_record` - Hostnames attached to a store
//! - `hostname` - Validated hostname value object
//! - `subscription_status` - Billing state machine
//! - `ssl_status` - Certificate pipeline state machine
//! - `context` - Explicit payment-routing context

mod context;
mod domain_record;
mod hostname;
mod ssl_status;
mod subscription_status;
mod tenant;

pub use context::TenantContext;
pub use domain_record::TenantDomain;
pub use hostname::Hostname;
pub use ssl_status::SslStatus;
pub use subscription_status::SubscriptionStatus;
pub use tenant::{AdminCredential, SslCertInfo, Tenant, VERIFICATION_TOKEN_KEY};

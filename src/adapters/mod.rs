//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the application layer to the outside world:
//! - `gateways` - Payment provider drivers
//! - `provisioning` - DNS, certbot, Bagisto install, Nginx, tenant MySQL
//! - `secrets` - Envelope encryption for stored credentials
//! - `memory` - In-memory stores for tests and single-node deployments
//! - `http` - Inbound webhook and WHMCS endpoints

pub mod gateways;
pub mod http;
pub mod memory;
pub mod provisioning;
pub mod secrets;

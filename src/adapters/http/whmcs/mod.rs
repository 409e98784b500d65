//! HTTP adapter for the WHMCS billing integration.
//!
//! WHMCS server modules call these endpoints on provisioning events. Every
//! route requires the shared `X-Api-Key` header and answers with the flat
//! `success`/`message` envelope the module parses.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::WhmcsAppState;
pub use routes::whmcs_router;

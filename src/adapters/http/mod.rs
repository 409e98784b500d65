//! HTTP adapters.
//!
//! Two inbound surfaces: gateway webhooks and the WHMCS billing API.

pub mod webhooks;
pub mod whmcs;

pub use webhooks::{webhook_router, WebhookAppState};
pub use whmcs::{whmcs_router, WhmcsAppState};

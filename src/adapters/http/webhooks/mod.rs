//! HTTP adapter for inbound gateway webhooks.
//!
//! One endpoint, selected by a static path segment per provider:
//! `POST /webhooks/:gateway`. Known gateways are always acknowledged with
//! 200, matched reference or not, because a non-2xx puts the provider into
//! a retry storm.

pub mod handlers;
pub mod routes;

pub use handlers::WebhookAppState;
pub use routes::webhook_router;

//! Route configuration for webhook endpoints.

use axum::routing::post;
use axum::Router;

use super::handlers::{receive_webhook, WebhookAppState};

/// Creates the webhook router.
///
/// Routes:
/// - `POST /webhooks/:gateway` - Receive one provider webhook
///
/// The path segment is the gateway's stable wire identifier, for example
/// `/webhooks/paystack` or `/webhooks/mpesa_kenya`.
pub fn webhook_router() -> Router<WebhookAppState> {
    Router::new().route("/webhooks/:gateway", post(receive_webhook))
}

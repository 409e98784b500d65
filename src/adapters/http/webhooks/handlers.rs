//! HTTP handlers for gateway webhook deliveries.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::info;

use crate::application::PaymentManager;
use crate::domain::payment::GatewayId;
use crate::ports::WebhookDelivery;

/// Application state for webhook endpoints.
#[derive(Clone)]
pub struct WebhookAppState {
    pub manager: Arc<PaymentManager>,
}

/// Receive one provider webhook.
///
/// POST /webhooks/:gateway
///
/// The raw body is passed through untouched; signature checks inside the
/// drivers run over the exact bytes the provider signed.
pub async fn receive_webhook(
    State(state): State<WebhookAppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Ok(gateway) = gateway.parse::<GatewayId>() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown gateway" })),
        );
    };

    let delivery = WebhookDelivery::new(plain_headers(&headers), body.to_vec());
    let ack = state.manager.handle_webhook(gateway, delivery).await;
    info!(%gateway, matched = ack.matched, status = ?ack.status, "webhook acknowledged");

    (StatusCode::OK, Json(json!({ "received": true })))
}

fn plain_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

//! Request handlers for the WHMCS provisioning API.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::{error, info};

use crate::application::whmcs::{WhmcsError, WhmcsService};
use crate::application::ProvisioningError;
use crate::ports::StoreError;

use super::dto::{
    CreateStoreDto, CreatedStoreResponse, LifecycleDto, ModuleResponse, StatusResponse,
};

/// Header WHMCS presents the shared key in.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared state for the WHMCS routes.
#[derive(Clone)]
pub struct WhmcsAppState {
    pub service: Arc<WhmcsService>,
    pub api_key: SecretString,
}

// ═══════════════════════════════════════════════════════════════════════════
// Authentication middleware
// ═══════════════════════════════════════════════════════════════════════════

/// Rejects the request before any tenant access unless the `X-Api-Key`
/// header matches the configured key. The comparison is constant-time.
pub async fn require_api_key(
    State(state): State<WhmcsAppState>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let expected = state.api_key.expose_secret();
    if expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() != 1 {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ModuleResponse::failure("invalid API key")),
        )
            .into_response();
    }

    next.run(request).await
}

// ═══════════════════════════════════════════════════════════════════════════
// Action handlers
// ═══════════════════════════════════════════════════════════════════════════

/// `POST /whmcs/create`
pub async fn create_store(
    State(state): State<WhmcsAppState>,
    Json(dto): Json<CreateStoreDto>,
) -> Response {
    info!(domain = %dto.domain, "whmcs create requested");
    match state.service.create(dto.into_request()).await {
        Ok(created) => (StatusCode::OK, Json(CreatedStoreResponse::from(created))).into_response(),
        Err(err) => error_response("create", err),
    }
}

/// `POST /whmcs/suspend`
pub async fn suspend_store(
    State(state): State<WhmcsAppState>,
    Json(dto): Json<LifecycleDto>,
) -> Response {
    match state.service.suspend(&dto.reference).await {
        Ok(()) => (StatusCode::OK, Json(ModuleResponse::ok())).into_response(),
        Err(err) => error_response("suspend", err),
    }
}

/// `POST /whmcs/unsuspend`
pub async fn unsuspend_store(
    State(state): State<WhmcsAppState>,
    Json(dto): Json<LifecycleDto>,
) -> Response {
    match state.service.unsuspend(&dto.reference).await {
        Ok(()) => (StatusCode::OK, Json(ModuleResponse::ok())).into_response(),
        Err(err) => error_response("unsuspend", err),
    }
}

/// `POST /whmcs/terminate`
pub async fn terminate_store(
    State(state): State<WhmcsAppState>,
    Json(dto): Json<LifecycleDto>,
) -> Response {
    match state.service.terminate(&dto.reference).await {
        Ok(()) => (StatusCode::OK, Json(ModuleResponse::ok())).into_response(),
        Err(err) => error_response("terminate", err),
    }
}

/// `POST /whmcs/changeplan`
pub async fn change_plan(
    State(state): State<WhmcsAppState>,
    Json(dto): Json<LifecycleDto>,
) -> Response {
    let Some(plan) = dto.plan else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ModuleResponse::failure("plan is required")),
        )
            .into_response();
    };
    match state.service.change_plan(&dto.reference, &plan).await {
        Ok(()) => (StatusCode::OK, Json(ModuleResponse::ok())).into_response(),
        Err(err) => error_response("changeplan", err),
    }
}

/// `POST /whmcs/status`
pub async fn store_status(
    State(state): State<WhmcsAppState>,
    Json(dto): Json<LifecycleDto>,
) -> Response {
    match state.service.status(&dto.reference).await {
        Ok(report) => (
            StatusCode::OK,
            Json(StatusResponse {
                success: true,
                report,
            }),
        )
            .into_response(),
        Err(err) => error_response("status", err),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Error mapping
// ═══════════════════════════════════════════════════════════════════════════

fn error_response(action: &str, err: WhmcsError) -> Response {
    let status = match &err {
        WhmcsError::UnknownTenant(_) => StatusCode::NOT_FOUND,
        WhmcsError::Terminated(_) | WhmcsError::DomainTaken(_) | WhmcsError::Transition(_) => {
            StatusCode::CONFLICT
        }
        WhmcsError::Validation(_) => StatusCode::BAD_REQUEST,
        WhmcsError::Provisioning(provisioning) => match provisioning {
            ProvisioningError::TenantNotFound(_) => StatusCode::NOT_FOUND,
            ProvisioningError::TenantTerminated(_) | ProvisioningError::AlreadyProvisioned(_) => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        WhmcsError::Store(store) => match store {
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::Conflict { .. } => StatusCode::CONFLICT,
            StoreError::Backend { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        },
    };
    if status.is_server_error() {
        error!(action, %err, "whmcs action failed");
    }
    (status, Json(ModuleResponse::failure(err.to_string()))).into_response()
}

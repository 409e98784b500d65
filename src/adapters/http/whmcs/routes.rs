//! Route configuration for the WHMCS provisioning API.

use axum::routing::post;
use axum::{middleware, Router};

use super::handlers::{
    change_plan, create_store, require_api_key, store_status, suspend_store, terminate_store,
    unsuspend_store, WhmcsAppState,
};

/// Creates the WHMCS router with all module actions.
///
/// Routes:
/// - `POST /whmcs/create` - Provision a new store
/// - `POST /whmcs/suspend` - Pause a store for non-payment
/// - `POST /whmcs/unsuspend` - Reinstate a suspended store
/// - `POST /whmcs/terminate` - Soft-delete a store
/// - `POST /whmcs/changeplan` - Move a store to another plan
/// - `POST /whmcs/status` - Report the current store state
///
/// Every route sits behind the `X-Api-Key` check, so the router is built
/// with its state up front.
pub fn whmcs_router(state: WhmcsAppState) -> Router {
    Router::new()
        .route("/whmcs/create", post(create_store))
        .route("/whmcs/suspend", post(suspend_store))
        .route("/whmcs/unsuspend", post(unsuspend_store))
        .route("/whmcs/terminate", post(terminate_store))
        .route("/whmcs/changeplan", post(change_plan))
        .route("/whmcs/status", post(store_status))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}

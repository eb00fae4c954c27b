//! Route definitions for the registrar API

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};

use crate::error::attach_error_path;
use crate::handlers::health_check;
use crate::middleware::{authenticate, request_tracing, security_headers};
use crate::state::AppState;

mod auth;

pub use auth::auth_routes;

/// Build the full application router
///
/// Layer order, outermost first: error path stamping, request tracing,
/// security headers, then the authentication gate.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(auth_routes(&state))
        .with_state(state.clone())
        .layer(from_fn_with_state(state.gate.clone(), authenticate))
        .layer(from_fn(security_headers))
        .layer(from_fn(request_tracing))
        .layer(from_fn(attach_error_path))
}

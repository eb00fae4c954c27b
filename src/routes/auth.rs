//! Authentication routes

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};

use crate::handlers::auth;
use crate::middleware::{auth_rate_limit, no_store};
use crate::state::AppState;

/// Create authentication routes
///
/// Only register and login are metered by the rate limiter.
pub fn auth_routes(state: &AppState) -> Router<AppState> {
    let metered = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route_layer(from_fn_with_state(
            state.rate_limiter.clone(),
            auth_rate_limit,
        ));

    Router::new()
        .route("/auth/refresh", post(auth::refresh_token))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::get_current_user))
        .merge(metered)
        .layer(from_fn(no_store))
}

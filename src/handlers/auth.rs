//! Authentication HTTP handlers

use axum::{extract::State, http::StatusCode, Json};

use super::{AuthenticatedUser, ValidatedJson};
use crate::error::ApiError;
use crate::models::{
    AuthTokens, LoginRequest, LogoutResponse, RefreshTokenRequest, RegisterRequest, UserResponse,
};
use crate::state::AppState;

/// POST /auth/register - Create an account and issue its first token pair
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthTokens>), ApiError> {
    let tokens = state
        .credential_service
        .register(&req.full_name, &req.email, &req.password)
        .await?;

    Ok((StatusCode::CREATED, Json(tokens)))
}

/// POST /auth/login - Verify credentials and start a new session
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<AuthTokens>, ApiError> {
    let tokens = state
        .credential_service
        .login(&req.email, &req.password)
        .await?;

    Ok(Json(tokens))
}

/// POST /auth/refresh - Exchange a refresh token for a new pair
pub async fn refresh_token(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshTokenRequest>,
) -> Result<Json<AuthTokens>, ApiError> {
    let tokens = state
        .credential_service
        .refresh(&req.refresh_token)
        .await?;

    Ok(Json(tokens))
}

/// GET /auth/me - Get current authenticated user
pub async fn get_current_user(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .credential_service
        .current_user(principal.user_id)
        .await?;

    Ok(Json(user.into()))
}

/// POST /auth/logout - Revoke all refresh tokens of the current user
pub async fn logout(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> Result<Json<LogoutResponse>, ApiError> {
    let revoked_tokens = state.credential_service.logout(principal.user_id).await?;

    Ok(Json(LogoutResponse { revoked_tokens }))
}

//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::{BcryptHasher, CredentialService, TokenCodec, TokenError, TokenTtls};
use crate::clock::Clock;
use crate::config::Config;
use crate::middleware::{AuthenticationGate, RateLimiter};
use crate::store::CredentialStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub credential_service: Arc<CredentialService>,
    pub gate: Arc<AuthenticationGate>,
    pub rate_limiter: RateLimiter,
    pub store: Arc<dyn CredentialStore>,
}

impl AppState {
    pub fn new(
        credential_service: Arc<CredentialService>,
        gate: Arc<AuthenticationGate>,
        rate_limiter: RateLimiter,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            credential_service,
            gate,
            rate_limiter,
            store,
        }
    }

    /// Wire every component from configuration
    ///
    /// Fails if the signing secret is too short, which aborts startup.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TokenError> {
        let codec = Arc::new(TokenCodec::new(
            config.jwt_secret.as_bytes(),
            config.jwt_issuer.clone(),
            clock.clone(),
        )?);

        let credential_service = Arc::new(CredentialService::new(
            store.clone(),
            Arc::new(BcryptHasher::new(config.bcrypt_cost)),
            codec.clone(),
            clock.clone(),
            TokenTtls {
                access_seconds: config.jwt_access_token_ttl_seconds,
                refresh_seconds: config.jwt_refresh_token_ttl_seconds,
            },
        ));

        let gate = Arc::new(
            AuthenticationGate::new(codec, store.clone())
                .reject_invalid(config.auth_reject_invalid_tokens),
        );

        let rate_limiter = RateLimiter::new(config.auth_rate_limit_per_minute, clock)
            .trust_proxy_headers(config.rate_limit_trust_proxy);

        Ok(Self::new(credential_service, gate, rate_limiter, store))
    }
}

impl FromRef<AppState> for Arc<CredentialService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.credential_service.clone()
    }
}

impl FromRef<AppState> for Arc<AuthenticationGate> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.gate.clone()
    }
}

impl FromRef<AppState> for RateLimiter {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.rate_limiter.clone()
    }
}

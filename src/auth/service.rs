//! Credential service
//!
//! Core business logic for registration, login and refresh-token rotation.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::{AuthTokens, NewRefreshToken, NewUser, Role, User};
use crate::store::{CredentialStore, StoreError};

use super::codec::{ClaimSet, TokenCodec, TokenError, TokenType};
use super::password::{HashError, PasswordHasher};

/// Auth service errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Email is already registered")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Password hashing error: {0}")]
    Hashing(#[from] HashError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Store(e)
    }
}

/// Token lifetimes used when minting pairs
#[derive(Debug, Clone, Copy)]
pub struct TokenTtls {
    pub access_seconds: i64,
    pub refresh_seconds: i64,
}

/// Credential service
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    codec: Arc<TokenCodec>,
    clock: Arc<dyn Clock>,
    ttls: TokenTtls,
    /// Hash checked against when a login names no account
    decoy_hash: Arc<OnceCell<String>>,
}

const DECOY_PASSWORD: &str = "decoy-password-for-unknown-accounts";

impl CredentialService {
    /// Create a new CredentialService
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        codec: Arc<TokenCodec>,
        clock: Arc<dyn Clock>,
        ttls: TokenTtls,
    ) -> Self {
        Self {
            store,
            hasher,
            codec,
            clock,
            ttls,
            decoy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Register a new USER account and issue its first token pair
    pub async fn register(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthTokens, AuthError> {
        let email = normalize_email(email);

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.hash_password(password).await?;

        let user = self
            .store
            .insert_user(NewUser {
                full_name: full_name.trim().to_string(),
                email,
                password_hash,
                role: Role::User,
            })
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent registration of the same email.
                StoreError::Duplicate(_) => AuthError::EmailTaken,
                other => AuthError::Store(other),
            })?;

        tracing::info!(user_id = %user.id, "User registered");

        let (tokens, refresh) = self.mint_pair(&user)?;
        self.store.insert_refresh_token(refresh).await?;

        Ok(tokens)
    }

    /// Verify credentials, end previous sessions and issue a fresh pair
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthTokens, AuthError> {
        let email = normalize_email(email);

        let user = match self.store.find_user_by_email(&email).await? {
            Some(user) => user,
            None => {
                // Pay the same bcrypt cost as a known account.
                let decoy = self.decoy_hash().await?;
                let _ = self.verify_password(password, &decoy).await?;
                tracing::debug!("Login failed: unknown account");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.verify_password(password, &user.password_hash).await? {
            tracing::debug!(user_id = %user.id, "Login failed: password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        // Committed before the new token exists, so no stale chain survives.
        let revoked = self.store.revoke_all_active_for_user(user.id).await?;

        let (tokens, refresh) = self.mint_pair(&user)?;
        self.store.insert_refresh_token(refresh).await?;

        tracing::info!(user_id = %user.id, revoked_tokens = revoked, "User logged in");

        Ok(tokens)
    }

    /// Exchange a refresh token for a new pair; every token is single-use
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let stored = self
            .store
            .find_refresh_token(refresh_token)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if stored.revoked {
            tracing::debug!(token_id = %stored.id, "Refresh with revoked token");
            return Err(AuthError::InvalidRefreshToken);
        }

        if stored.expires_at <= self.clock.now() {
            self.store.revoke_refresh_token(stored.id).await?;
            tracing::debug!(token_id = %stored.id, "Refresh with expired token");
            return Err(AuthError::InvalidRefreshToken);
        }

        let claims = match self.codec.verify_as(&stored.token, TokenType::Refresh) {
            Ok(claims) if claims.uid == stored.user_id => claims,
            Ok(_) => {
                self.burn(stored.id, "owner mismatch").await?;
                return Err(AuthError::InvalidRefreshToken);
            }
            Err(e) => {
                self.burn(stored.id, &e.to_string()).await?;
                return Err(AuthError::InvalidRefreshToken);
            }
        };

        let user = match self.store.find_user_by_id(claims.uid).await? {
            Some(user) => user,
            None => {
                self.burn(stored.id, "account no longer exists").await?;
                return Err(AuthError::InvalidRefreshToken);
            }
        };

        let (tokens, replacement) = self.mint_pair(&user)?;

        match self.store.rotate_refresh_token(stored.id, replacement).await? {
            Some(_) => {
                tracing::debug!(user_id = %user.id, "Refresh token rotated");
                Ok(tokens)
            }
            None => {
                tracing::debug!(token_id = %stored.id, "Refresh token already consumed");
                Err(AuthError::InvalidRefreshToken)
            }
        }
    }

    /// Load the account behind an authenticated principal
    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Revoke every active refresh token of a user
    pub async fn logout(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self.store.revoke_all_active_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, revoked_tokens = revoked, "User logged out");
        Ok(revoked)
    }

    pub fn ttls(&self) -> TokenTtls {
        self.ttls
    }

    /// Issue an access/refresh pair and the row that persists the refresh half
    fn mint_pair(&self, user: &User) -> Result<(AuthTokens, NewRefreshToken), AuthError> {
        let access_token =
            self.codec
                .issue(&user.email, ClaimSet::access(user), self.ttls.access_seconds)?;
        let refresh_token =
            self.codec
                .issue(&user.email, ClaimSet::refresh(user), self.ttls.refresh_seconds)?;

        // The row expires exactly when the token's own exp claim does.
        let claims = self.codec.verify(&refresh_token)?;
        let expires_at = timestamp_to_datetime(claims.exp)?;

        let row = NewRefreshToken {
            token: refresh_token.clone(),
            user_id: user.id,
            expires_at,
        };

        let tokens = AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in_seconds: self.ttls.access_seconds,
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
        };

        Ok((tokens, row))
    }

    async fn burn(&self, token_id: Uuid, reason: &str) -> Result<(), AuthError> {
        tracing::warn!(token_id = %token_id, reason = %reason, "Burning unusable refresh token");
        self.store.revoke_refresh_token(token_id).await?;
        Ok(())
    }

    async fn decoy_hash(&self) -> Result<String, AuthError> {
        self.decoy_hash
            .get_or_try_init(|| self.hash_password(DECOY_PASSWORD))
            .await
            .cloned()
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Hashing(HashError::Hash(e.to_string())))?
            .map_err(AuthError::from)
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::Hashing(HashError::Hash(e.to_string())))?
            .map_err(AuthError::from)
    }
}

/// Trim and lowercase an email for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn timestamp_to_datetime(ts: i64) -> Result<DateTime<Utc>, AuthError> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or(AuthError::Token(TokenError::Malformed))
}

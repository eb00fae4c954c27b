//! Credential persistence
//!
//! [`CredentialStore`] is the persistence boundary of the authentication
//! core. Every method is atomic on its own; `rotate_refresh_token` is the only
//! multi-row operation and must run as a single transaction.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewRefreshToken, NewUser, RefreshToken, User};

mod memory;
mod postgres;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Duplicate(db_err.message().to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Users and their refresh tokens
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find a user by normalized email
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Insert a user; fails with [`StoreError::Duplicate`] if the email is taken
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;

    /// Look up a refresh token row by its exact value
    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError>;

    async fn insert_refresh_token(
        &self,
        token: NewRefreshToken,
    ) -> Result<RefreshToken, StoreError>;

    /// Revoke every non-revoked token of a user, returning how many changed
    async fn revoke_all_active_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Revoke one token; `Ok(false)` if it was already revoked
    async fn revoke_refresh_token(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Revoke `old_id` and insert `replacement` in one transaction
    ///
    /// The revoke only applies while the old row is still non-revoked. When it
    /// is not, nothing is written and `Ok(None)` is returned, so of two callers
    /// rotating the same token exactly one gets `Some`.
    async fn rotate_refresh_token(
        &self,
        old_id: Uuid,
        replacement: NewRefreshToken,
    ) -> Result<Option<RefreshToken>, StoreError>;

    /// Connectivity check for health reporting
    async fn ping(&self) -> Result<(), StoreError>;
}

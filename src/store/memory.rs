//! In-memory credential store for development and tests

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{CredentialStore, StoreError};
use crate::models::{NewRefreshToken, NewUser, RefreshToken, User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    user_ids_by_email: HashMap<String, Uuid>,
    tokens: HashMap<Uuid, RefreshToken>,
    token_ids_by_value: HashMap<String, Uuid>,
}

impl Tables {
    fn insert_token(&mut self, token: NewRefreshToken) -> Result<RefreshToken, StoreError> {
        if self.token_ids_by_value.contains_key(&token.token) {
            return Err(StoreError::Duplicate("refresh_tokens.token".to_string()));
        }

        let row = RefreshToken {
            id: Uuid::new_v4(),
            token: token.token,
            user_id: token.user_id,
            expires_at: token.expires_at,
            revoked: false,
            revoked_at: None,
            created_at: Utc::now(),
        };
        self.token_ids_by_value.insert(row.token.clone(), row.id);
        self.tokens.insert(row.id, row.clone());

        Ok(row)
    }

    fn revoke(&mut self, id: Uuid) -> bool {
        match self.tokens.get_mut(&id) {
            Some(row) if !row.revoked => {
                row.revoked = true;
                row.revoked_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }
}

/// [`CredentialStore`] kept behind a single mutex
///
/// Every operation holds the lock for its whole duration, which gives the
/// same atomicity the Postgres store gets from transactions.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    tables: Mutex<Tables>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored refresh tokens, revoked or not
    pub fn refresh_token_count(&self) -> usize {
        self.tables.lock().tokens.len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .user_ids_by_email
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().users.get(&id).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.lock();
        if tables.user_ids_by_email.contains_key(&user.email) {
            return Err(StoreError::Duplicate("users.email".to_string()));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            full_name: user.full_name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        tables
            .user_ids_by_email
            .insert(created.email.clone(), created.id);
        tables.users.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .token_ids_by_value
            .get(token)
            .and_then(|id| tables.tokens.get(id))
            .cloned())
    }

    async fn insert_refresh_token(
        &self,
        token: NewRefreshToken,
    ) -> Result<RefreshToken, StoreError> {
        self.tables.lock().insert_token(token)
    }

    async fn revoke_all_active_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock();
        let now = Utc::now();
        let mut revoked = 0;
        for row in tables
            .tokens
            .values_mut()
            .filter(|row| row.user_id == user_id && !row.revoked)
        {
            row.revoked = true;
            row.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.lock().revoke(id))
    }

    async fn rotate_refresh_token(
        &self,
        old_id: Uuid,
        replacement: NewRefreshToken,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let mut tables = self.tables.lock();
        if tables.token_ids_by_value.contains_key(&replacement.token) {
            return Err(StoreError::Duplicate("refresh_tokens.token".to_string()));
        }
        if !tables.revoke(old_id) {
            return Ok(None);
        }
        tables.insert_token(replacement).map(Some)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

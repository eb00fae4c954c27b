//! PostgreSQL credential store

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CredentialStore, StoreError};
use crate::models::{NewRefreshToken, NewUser, RefreshToken, User};

/// sqlx-backed [`CredentialStore`]
#[derive(Clone)]
pub struct PgCredentialStore {
    db_pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Get database pool
    pub fn db_pool(&self) -> &PgPool {
        &self.db_pool
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as(
            r#"
            SELECT id, full_name, email, password_hash, role, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as(
            r#"
            SELECT id, full_name, email, password_hash, role, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(user)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let created = sqlx::query_as(
            r#"
            INSERT INTO users (id, full_name, email, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING id, full_name, email, password_hash, role, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await?;

        Ok(created)
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        let row = sqlx::query_as(
            r#"
            SELECT id, token, user_id, expires_at, revoked, revoked_at, created_at
            FROM refresh_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(row)
    }

    async fn insert_refresh_token(
        &self,
        token: NewRefreshToken,
    ) -> Result<RefreshToken, StoreError> {
        let row = sqlx::query_as(
            r#"
            INSERT INTO refresh_tokens (id, token, user_id, expires_at, revoked, created_at)
            VALUES ($1, $2, $3, $4, FALSE, $5)
            RETURNING id, token, user_id, expires_at, revoked, revoked_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.expires_at)
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await?;

        Ok(row)
    }

    async fn revoke_all_active_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE user_id = $1 AND revoked = FALSE
            "#,
        )
        .bind(user_id)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected)
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> Result<bool, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE id = $1 AND revoked = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected == 1)
    }

    async fn rotate_refresh_token(
        &self,
        old_id: Uuid,
        replacement: NewRefreshToken,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let mut tx = self.db_pool.begin().await?;

        // Conditional update: only one concurrent caller can flip the row.
        let rows_affected = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE id = $1 AND revoked = FALSE
            "#,
        )
        .bind(old_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query_as(
            r#"
            INSERT INTO refresh_tokens (id, token, user_id, expires_at, revoked, created_at)
            VALUES ($1, $2, $3, $4, FALSE, $5)
            RETURNING id, token, user_id, expires_at, revoked, revoked_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&replacement.token)
        .bind(replacement.user_id)
        .bind(replacement.expires_at)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(row))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.db_pool).await?;
        Ok(())
    }
}

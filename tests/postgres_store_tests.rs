//! PostgreSQL credential store tests

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use sqlx::PgPool;
    use uuid::Uuid;

    use registrar_server::db;
    use registrar_server::models::{NewRefreshToken, NewUser, Role};
    use registrar_server::store::{CredentialStore, PgCredentialStore, StoreError};

    /// Helper to create a migrated test database pool
    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/registrar_test".to_string());

        let pool = db::create_pool(&database_url, 2)
            .await
            .expect("Failed to connect to test database");
        db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    fn new_user() -> NewUser {
        NewUser {
            full_name: "Alice".to_string(),
            email: format!("alice-{}@example.com", Uuid::new_v4()),
            password_hash: "$2b$04$placeholder".to_string(),
            role: Role::User,
        }
    }

    fn new_token(user_id: Uuid) -> NewRefreshToken {
        NewRefreshToken {
            token: format!("token-{}", Uuid::new_v4()),
            user_id,
            expires_at: Utc::now() + Duration::days(7),
        }
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_duplicate_email_is_reported() {
        let store = PgCredentialStore::new(setup_test_db().await);
        let user = new_user();

        store.insert_user(user.clone()).await.unwrap();
        let err = store.insert_user(user).await.unwrap_err();

        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_rotation_is_single_use() {
        let store = PgCredentialStore::new(setup_test_db().await);
        let user = store.insert_user(new_user()).await.unwrap();
        let original = store.insert_refresh_token(new_token(user.id)).await.unwrap();

        let first = store
            .rotate_refresh_token(original.id, new_token(user.id))
            .await
            .unwrap();
        let second = store
            .rotate_refresh_token(original.id, new_token(user.id))
            .await
            .unwrap();

        assert!(first.is_some());
        assert!(second.is_none());

        let row = store.find_refresh_token(&original.token).await.unwrap().unwrap();
        assert!(row.revoked);
        assert!(row.revoked_at.is_some());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_revoke_all_active_for_user() {
        let store = PgCredentialStore::new(setup_test_db().await);
        let user = store.insert_user(new_user()).await.unwrap();
        store.insert_refresh_token(new_token(user.id)).await.unwrap();
        store.insert_refresh_token(new_token(user.id)).await.unwrap();

        assert_eq!(store.revoke_all_active_for_user(user.id).await.unwrap(), 2);
        assert_eq!(store.revoke_all_active_for_user(user.id).await.unwrap(), 0);
        assert!(store.ping().await.is_ok());
    }
}

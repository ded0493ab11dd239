//! Push device registry.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::time::now_ms;
use crate::notification::UserId;

/// Device repository trait.
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// The user's active registration token, if any.
    async fn active_token(&self, user_id: UserId) -> Result<Option<String>>;
    /// Make `registration_id` the user's only active token.
    async fn register(&self, user_id: UserId, registration_id: &str) -> Result<()>;
    /// Deactivate a token the gateway no longer accepts. Returns whether an
    /// active token was changed.
    async fn deactivate(&self, registration_id: &str) -> Result<bool>;
}

/// SQLx implementation of DeviceRepository.
pub struct SqlxDeviceRepository {
    pool: SqlitePool,
}

impl SqlxDeviceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceRepository for SqlxDeviceRepository {
    async fn active_token(&self, user_id: UserId) -> Result<Option<String>> {
        let token: Option<(String,)> = sqlx::query_as(
            "SELECT registration_id FROM fcm_device WHERE user_id = ? AND active = TRUE",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token.map(|(t,)| t))
    }

    async fn register(&self, user_id: UserId, registration_id: &str) -> Result<()> {
        let now = now_ms();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE fcm_device SET active = FALSE, updated_at = ?
            WHERE user_id = ? AND active = TRUE AND registration_id <> ?
            "#,
        )
        .bind(now)
        .bind(user_id)
        .bind(registration_id)
        .execute(&mut *tx)
        .await?;

        // A token moving between accounts (re-login on a shared device) is
        // taken over by the new owner.
        sqlx::query(
            r#"
            INSERT INTO fcm_device (user_id, registration_id, active, created_at, updated_at)
            VALUES (?, ?, TRUE, ?, ?)
            ON CONFLICT(registration_id) DO UPDATE SET
                user_id = excluded.user_id,
                active = TRUE,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(registration_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn deactivate(&self, registration_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE fcm_device SET active = FALSE, updated_at = ? WHERE registration_id = ? AND active = TRUE",
        )
        .bind(now_ms())
        .bind(registration_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::FcmDeviceDbModel;
    use crate::database::{init_pool_with_size, run_migrations};

    async fn device_by_token(repo: &SqlxDeviceRepository, token: &str) -> FcmDeviceDbModel {
        sqlx::query_as::<_, FcmDeviceDbModel>("SELECT * FROM fcm_device WHERE registration_id = ?")
            .bind(token)
            .fetch_one(&repo.pool)
            .await
            .unwrap()
    }

    async fn setup() -> SqlxDeviceRepository {
        let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqlxDeviceRepository::new(pool)
    }

    #[tokio::test]
    async fn test_no_device() {
        let repo = setup().await;
        assert_eq!(repo.active_token(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_register_replaces_active_token() {
        let repo = setup().await;
        repo.register(1, "token-a").await.unwrap();
        repo.register(1, "token-b").await.unwrap();

        assert_eq!(repo.active_token(1).await.unwrap().as_deref(), Some("token-b"));
        let old = device_by_token(&repo, "token-a").await;
        assert!(!old.active);
    }

    #[tokio::test]
    async fn test_register_same_token_twice() {
        let repo = setup().await;
        repo.register(1, "token-a").await.unwrap();
        repo.register(1, "token-a").await.unwrap();
        assert_eq!(repo.active_token(1).await.unwrap().as_deref(), Some("token-a"));
    }

    #[tokio::test]
    async fn test_token_moves_between_users() {
        let repo = setup().await;
        repo.register(1, "shared").await.unwrap();
        repo.register(2, "shared").await.unwrap();

        assert_eq!(repo.active_token(1).await.unwrap(), None);
        assert_eq!(repo.active_token(2).await.unwrap().as_deref(), Some("shared"));
    }

    #[tokio::test]
    async fn test_deactivate() {
        let repo = setup().await;
        repo.register(1, "token-a").await.unwrap();

        assert!(repo.deactivate("token-a").await.unwrap());
        assert!(!repo.deactivate("token-a").await.unwrap());
        assert_eq!(repo.active_token(1).await.unwrap(), None);

        // Re-registering reactivates it.
        repo.register(1, "token-a").await.unwrap();
        assert_eq!(repo.active_token(1).await.unwrap().as_deref(), Some("token-a"));
    }
}

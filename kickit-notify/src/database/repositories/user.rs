//! User directory backed by the `user_profile` table.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{UNKNOWN_DISPLAY_NAME, UserProfileDbModel};
use crate::notification::UserId;

/// Read-only view of accounts needed to build notifications.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Name shown in notification text. Unknown users yield "Unknown".
    async fn display_name(&self, user_id: UserId) -> Result<String>;
    /// Case-sensitive exact match on the current nickname.
    async fn resolve_by_nickname(&self, nickname: &str) -> Result<Option<UserId>>;
}

/// SQLx implementation of UserDirectory.
pub struct SqlxUserDirectory {
    pool: SqlitePool,
}

impl SqlxUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or update a profile. Used by account sync and tests.
    pub async fn upsert_profile(&self, profile: &UserProfileDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_profile (user_id, username, nickname)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                nickname = excluded.nickname
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.username)
        .bind(&profile.nickname)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for SqlxUserDirectory {
    async fn display_name(&self, user_id: UserId) -> Result<String> {
        let profile = sqlx::query_as::<_, UserProfileDbModel>(
            "SELECT * FROM user_profile WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile
            .map(|p| p.display_name())
            .unwrap_or_else(|| UNKNOWN_DISPLAY_NAME.to_string()))
    }

    async fn resolve_by_nickname(&self, nickname: &str) -> Result<Option<UserId>> {
        // `=` on TEXT uses BINARY collation, so this is case-sensitive.
        let user: Option<(i64,)> =
            sqlx::query_as("SELECT user_id FROM user_profile WHERE nickname = ?")
                .bind(nickname)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user.map(|(id,)| id))
    }
}

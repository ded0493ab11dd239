//! Notification preference repository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::Result;
use crate::database::models::UserSettingDbModel;
use crate::database::time::now_ms;
use crate::notification::{NotificationCategory, NotificationPreferences, UserId};

/// Preference repository trait.
#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    /// Current preferences. A user without a settings row gets
    /// [`NotificationPreferences::default`], never an error.
    async fn get_preferences(&self, user_id: UserId) -> Result<NotificationPreferences>;
    /// Replace the stored preferences for `user_id`.
    async fn save_preferences(&self, user_id: UserId, prefs: &NotificationPreferences) -> Result<()>;
    /// Store new-account defaults unless the user already has settings.
    /// Returns the effective preferences either way.
    async fn create_default_preferences(&self, user_id: UserId) -> Result<NotificationPreferences>;
    async fn set_category_enabled(
        &self,
        user_id: UserId,
        category: NotificationCategory,
        enabled: bool,
    ) -> Result<()>;
}

/// SQLx implementation of PreferenceRepository.
pub struct SqlxPreferenceRepository {
    pool: SqlitePool,
}

impl SqlxPreferenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceRepository for SqlxPreferenceRepository {
    async fn get_preferences(&self, user_id: UserId) -> Result<NotificationPreferences> {
        let setting = sqlx::query_as::<_, UserSettingDbModel>(
            "SELECT * FROM user_setting WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(setting) = setting else {
            debug!(user_id, "No notification settings; using safe defaults");
            return Ok(NotificationPreferences::default());
        };

        let labels: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT nc.name FROM notification_category nc
            INNER JOIN user_setting_category usc ON nc.id = usc.category_id
            WHERE usc.user_id = ?
            ORDER BY nc.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let enabled_categories = labels
            .into_iter()
            .filter_map(|(label,)| {
                let category = NotificationCategory::from_label(&label);
                if category.is_none() {
                    debug!(user_id, label = %label, "Ignoring unknown notification category label");
                }
                category
            })
            .collect();

        Ok(NotificationPreferences {
            enabled_categories,
            meetup_notifications_enabled: setting.meetup_notifications_enabled,
            push_enabled: setting.push_enabled,
        })
    }

    async fn save_preferences(&self, user_id: UserId, prefs: &NotificationPreferences) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO user_setting (user_id, push_enabled, meetup_notifications_enabled, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                push_enabled = excluded.push_enabled,
                meetup_notifications_enabled = excluded.meetup_notifications_enabled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(prefs.push_enabled)
        .bind(prefs.meetup_notifications_enabled)
        .bind(now_ms())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM user_setting_category WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for category in &prefs.enabled_categories {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO user_setting_category (user_id, category_id)
                SELECT ?, id FROM notification_category WHERE name = ?
                "#,
            )
            .bind(user_id)
            .bind(category.label())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn create_default_preferences(&self, user_id: UserId) -> Result<NotificationPreferences> {
        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT user_id FROM user_setting WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        if existing.is_some() {
            return self.get_preferences(user_id).await;
        }

        let defaults = NotificationPreferences::new_account_defaults();
        self.save_preferences(user_id, &defaults).await?;
        debug!(user_id, "Created default notification settings");
        Ok(defaults)
    }

    async fn set_category_enabled(
        &self,
        user_id: UserId,
        category: NotificationCategory,
        enabled: bool,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = now_ms();

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO user_setting (user_id, push_enabled, meetup_notifications_enabled, updated_at)
            VALUES (?, FALSE, FALSE, ?)
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let sql = if enabled {
            r#"
            INSERT OR IGNORE INTO user_setting_category (user_id, category_id)
            SELECT ?, id FROM notification_category WHERE name = ?
            "#
        } else {
            r#"
            DELETE FROM user_setting_category
            WHERE user_id = ?
              AND category_id IN (SELECT id FROM notification_category WHERE name = ?)
            "#
        };

        sqlx::query(sql)
            .bind(user_id)
            .bind(category.label())
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE user_setting SET updated_at = ? WHERE user_id = ?")
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

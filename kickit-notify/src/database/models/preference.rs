//! User notification setting database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User setting database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserSettingDbModel {
    pub user_id: i64,
    /// "Push & In_app" when true, "In_app" only when false
    pub push_enabled: bool,
    pub meetup_notifications_enabled: bool,
    /// Unix epoch milliseconds (UTC) of the last change.
    pub updated_at: i64,
}


//! User profile database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Display data for an account, owned by the account service.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserProfileDbModel {
    pub user_id: i64,
    pub username: String,
    /// Unique, case-sensitive, mutable
    pub nickname: Option<String>,
}

impl UserProfileDbModel {
    /// Nickname, then username, then "Unknown".
    pub fn display_name(&self) -> String {
        self.nickname
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(Some(self.username.as_str()).filter(|u| !u.trim().is_empty()))
            .unwrap_or(UNKNOWN_DISPLAY_NAME)
            .to_string()
    }
}

/// Shown when an account has no usable name or no longer exists.
pub const UNKNOWN_DISPLAY_NAME: &str = "Unknown";

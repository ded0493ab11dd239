//! Push device registration database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// FCM device database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FcmDeviceDbModel {
    pub id: i64,
    pub user_id: i64,
    /// FCM registration token
    pub registration_id: String,
    pub active: bool,
    /// Unix epoch milliseconds (UTC) when the token was first registered.
    pub created_at: i64,
    /// Unix epoch milliseconds (UTC) of the last registration or deactivation.
    pub updated_at: i64,
}

//! Dedup and eligibility checks run before a notification is written.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::category::NotificationGate;
use super::record::NotificationDraft;
use crate::Result;
use crate::database::repositories::{NotificationRepository, PreferenceRepository};

/// Why a draft was not turned into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum SuppressReason {
    SelfNotification,
    CategoryDisabled,
    MeetupDisabled,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// The record may be written; push only if `push_enabled`.
    Allowed { push_enabled: bool },
    Suppressed(SuppressReason),
}

impl Eligibility {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed(_))
    }
}

/// Decides whether a draft is suppressed. Rules, first match wins:
///
/// 1. sender == recipient
/// 2. the recipient's current preferences disable the draft's gate
/// 3. a record with the same dedup key already exists
///
/// Preferences are read on every call and never cached.
pub struct DedupGuard {
    preferences: Arc<dyn PreferenceRepository>,
    records: Arc<dyn NotificationRepository>,
}

impl DedupGuard {
    pub fn new(
        preferences: Arc<dyn PreferenceRepository>,
        records: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            preferences,
            records,
        }
    }

    pub async fn evaluate(&self, draft: &NotificationDraft) -> Result<Eligibility> {
        if draft.is_self_notification() {
            return Ok(Eligibility::Suppressed(SuppressReason::SelfNotification));
        }

        let prefs = self.preferences.get_preferences(draft.recipient).await?;
        if !prefs.allows(draft.gate) {
            let reason = match draft.gate {
                NotificationGate::Category(_) => SuppressReason::CategoryDisabled,
                NotificationGate::Meetup => SuppressReason::MeetupDisabled,
            };
            return Ok(Eligibility::Suppressed(reason));
        }

        if self.records.exists_with_key(&draft.dedup_key()).await? {
            return Ok(Eligibility::Suppressed(SuppressReason::Duplicate));
        }

        Ok(Eligibility::Allowed {
            push_enabled: prefs.push_enabled,
        })
    }

    pub async fn should_suppress(&self, draft: &NotificationDraft) -> Result<bool> {
        Ok(self.evaluate(draft).await?.is_suppressed())
    }
}

//! Per-user notification settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::category::{NotificationCategory, NotificationGate};

/// Resolved notification settings for one user.
///
/// `Default` is the safe value used when a user has no settings row: nothing
/// enabled, no push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub enabled_categories: BTreeSet<NotificationCategory>,
    pub meetup_notifications_enabled: bool,
    pub push_enabled: bool,
}

impl NotificationPreferences {
    /// Settings given to a freshly created account.
    pub fn new_account_defaults() -> Self {
        Self {
            enabled_categories: [NotificationCategory::Liked, NotificationCategory::Commented]
                .into_iter()
                .collect(),
            meetup_notifications_enabled: true,
            push_enabled: true,
        }
    }

    pub fn is_category_enabled(&self, category: NotificationCategory) -> bool {
        self.enabled_categories.contains(&category)
    }

    /// Whether a notification behind `gate` may be created.
    pub fn allows(&self, gate: NotificationGate) -> bool {
        match gate {
            NotificationGate::Category(category) => self.is_category_enabled(category),
            NotificationGate::Meetup => self.meetup_notifications_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allows_nothing() {
        let prefs = NotificationPreferences::default();
        assert!(!prefs.push_enabled);
        assert!(!prefs.allows(NotificationGate::Meetup));
        assert!(!prefs.allows(NotificationCategory::Liked.into()));
        assert!(!prefs.allows(NotificationCategory::Commented.into()));
        assert!(!prefs.allows(NotificationCategory::Mentioned.into()));
    }

    #[test]
    fn test_new_account_defaults() {
        let prefs = NotificationPreferences::new_account_defaults();
        assert!(prefs.push_enabled);
        assert!(prefs.allows(NotificationGate::Meetup));
        assert!(prefs.allows(NotificationCategory::Liked.into()));
        assert!(prefs.allows(NotificationCategory::Commented.into()));
        assert!(!prefs.allows(NotificationCategory::Mentioned.into()));
    }
}

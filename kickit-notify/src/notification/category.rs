//! Notification categories and the preference gate each notification passes.
//!
//! Category labels live in the `notification_category` configuration table as
//! free text. They are mapped to [`NotificationCategory`] at the repository
//! boundary; nothing past that boundary compares raw strings.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A user-toggleable class of board notifications.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum NotificationCategory {
    Liked,
    Commented,
    Mentioned,
}

impl NotificationCategory {
    /// Label used by the configuration table.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Liked => "Liked",
            Self::Commented => "Commented",
            Self::Mentioned => "Mentioned",
        }
    }

    /// Map a configuration label to a category. Surrounding whitespace is
    /// ignored; matching is otherwise exact.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::from_str(label.trim()).ok()
    }
}

/// Which preference decides whether a notification may be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "category")]
pub enum NotificationGate {
    /// Board notification gated by one category toggle.
    Category(NotificationCategory),
    /// Meetup notification gated by the meetup toggle.
    Meetup,
}

impl NotificationGate {
    /// Label stored in the `notification.category` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category(category) => category.label(),
            Self::Meetup => "Meetup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Meetup" => Some(Self::Meetup),
            other => NotificationCategory::from_label(other).map(Self::Category),
        }
    }

    pub fn category(&self) -> Option<NotificationCategory> {
        match self {
            Self::Category(category) => Some(*category),
            Self::Meetup => None,
        }
    }
}

impl From<NotificationCategory> for NotificationGate {
    fn from(category: NotificationCategory) -> Self {
        Self::Category(category)
    }
}

impl std::fmt::Display for NotificationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

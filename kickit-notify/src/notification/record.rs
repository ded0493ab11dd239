//! Notification drafts and persisted records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::category::NotificationGate;

/// Account identifier as issued by the account service.
pub type UserId = i64;

/// Entities a notification points at, used for client-side deep-linking.
///
/// Each event type populates a coherent subset; a meetup reminder, for
/// example, only carries `meetup_id`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meetup_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<i64>,
}

impl SubjectRefs {
    /// References for a post on a board.
    pub fn post(board_id: i64, post_id: i64) -> Self {
        Self {
            board_id: Some(board_id),
            post_id: Some(post_id),
            ..Self::default()
        }
    }

    /// References for a meetup.
    pub fn meetup(meetup_id: i64) -> Self {
        Self {
            meetup_id: Some(meetup_id),
            ..Self::default()
        }
    }

    pub fn with_comment(mut self, comment_id: i64) -> Self {
        self.comment_id = Some(comment_id);
        self
    }

    pub fn with_notice(mut self, notice_id: i64) -> Self {
        self.notice_id = Some(notice_id);
        self
    }

    pub fn with_question(mut self, question_id: i64) -> Self {
        self.question_id = Some(question_id);
        self
    }

    fn fields(&self) -> [(&'static str, Option<i64>); 6] {
        [
            ("board_id", self.board_id),
            ("post_id", self.post_id),
            ("comment_id", self.comment_id),
            ("meetup_id", self.meetup_id),
            ("notice_id", self.notice_id),
            ("question_id", self.question_id),
        ]
    }

    /// The non-null references, in a fixed field order.
    pub fn key_parts(&self) -> Vec<(&'static str, i64)> {
        self.fields()
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect()
    }

    /// String-keyed push data. Absent references are sent as empty strings
    /// so clients can rely on every key being present.
    pub fn to_push_data(&self) -> BTreeMap<String, String> {
        self.fields()
            .into_iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.map(|v| v.to_string()).unwrap_or_default(),
                )
            })
            .collect()
    }
}

/// A candidate notification, built by an event handler and handed to the
/// dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDraft {
    pub recipient: UserId,
    /// `None` for system notifications.
    pub sender: Option<UserId>,
    pub gate: NotificationGate,
    pub title: String,
    pub message: String,
    pub subject: SubjectRefs,
}

impl NotificationDraft {
    pub fn new(
        recipient: UserId,
        sender: Option<UserId>,
        gate: impl Into<NotificationGate>,
        title: impl Into<String>,
        message: impl Into<String>,
        subject: SubjectRefs,
    ) -> Self {
        Self {
            recipient,
            sender,
            gate: gate.into(),
            title: title.into(),
            message: message.into(),
            subject,
        }
    }

    pub fn is_self_notification(&self) -> bool {
        self.sender == Some(self.recipient)
    }

    /// Hex SHA-256 over (recipient, sender, title, non-null subject ids).
    ///
    /// The title is length-prefixed so no title can forge the separator of
    /// the fields that follow it. The message is deliberately excluded.
    pub fn dedup_key(&self) -> String {
        let mut canonical = String::with_capacity(64 + self.title.len());
        let _ = write!(canonical, "r={};", self.recipient);
        match self.sender {
            Some(sender) => {
                let _ = write!(canonical, "s={};", sender);
            }
            None => canonical.push_str("s=-;"),
        }
        let _ = write!(canonical, "t={}:{};", self.title.len(), self.title);
        for (name, value) in self.subject.key_parts() {
            let _ = write!(canonical, "{}={};", name, value);
        }

        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

/// A persisted in-app notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub recipient: UserId,
    pub sender: Option<UserId>,
    pub gate: NotificationGate,
    pub title: String,
    pub message: String,
    pub subject: SubjectRefs,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationCategory;

    fn draft(title: &str, subject: SubjectRefs) -> NotificationDraft {
        NotificationDraft::new(
            1,
            Some(2),
            NotificationCategory::Commented,
            title,
            "B commented on your post: hello",
            subject,
        )
    }

    #[test]
    fn test_dedup_key_is_stable() {
        let a = draft("New comment", SubjectRefs::post(1, 10).with_comment(100));
        let b = draft("New comment", SubjectRefs::post(1, 10).with_comment(100));
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.dedup_key().len(), 64);
    }

    #[test]
    fn test_dedup_key_ignores_message() {
        let a = draft("New comment", SubjectRefs::post(1, 10));
        let mut b = a.clone();
        b.message = "edited text".to_string();
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_dedup_key_distinguishes_subject_and_sender() {
        let base = draft("New comment", SubjectRefs::post(1, 10).with_comment(100));
        let other_comment = draft("New comment", SubjectRefs::post(1, 10).with_comment(101));
        assert_ne!(base.dedup_key(), other_comment.dedup_key());

        let mut system = base.clone();
        system.sender = None;
        assert_ne!(base.dedup_key(), system.dedup_key());

        // Same id in a different field is a different subject.
        let post_only = draft("t", SubjectRefs { post_id: Some(5), ..Default::default() });
        let meetup_only = draft("t", SubjectRefs::meetup(5));
        assert_ne!(post_only.dedup_key(), meetup_only.dedup_key());
    }

    #[test]
    fn test_title_cannot_forge_subject_fields() {
        let plain = draft("x", SubjectRefs::post(1, 2));
        let forged = draft("x;board_id=1;post_id=2", SubjectRefs::default());
        assert_ne!(plain.dedup_key(), forged.dedup_key());
    }

    #[test]
    fn test_push_data_uses_empty_strings_for_absent_refs() {
        let data = SubjectRefs::meetup(7).with_notice(3).to_push_data();
        assert_eq!(data.len(), 6);
        assert_eq!(data["meetup_id"], "7");
        assert_eq!(data["notice_id"], "3");
        assert_eq!(data["board_id"], "");
        assert_eq!(data["question_id"], "");
    }

    #[test]
    fn test_self_notification_detection() {
        let mut d = draft("t", SubjectRefs::default());
        assert!(!d.is_self_notification());
        d.sender = Some(d.recipient);
        assert!(d.is_self_notification());
        d.sender = None;
        assert!(!d.is_self_notification());
    }
}

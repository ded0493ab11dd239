//! Notification database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{now_ms, ms_to_datetime};
use crate::notification::{NotificationDraft, NotificationGate, NotificationRecord, SubjectRefs};
use crate::{Error, Result};

/// Notification database model.
/// One row per in-app notification; only `is_read` changes after insert.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationDbModel {
    pub id: i64,
    pub recipient_id: i64,
    /// NULL for system notifications
    pub sender_id: Option<i64>,
    /// Gate label: a category name or "Meetup"
    pub category: String,
    pub title: String,
    pub message: String,
    pub board_id: Option<i64>,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub meetup_id: Option<i64>,
    pub notice_id: Option<i64>,
    pub question_id: Option<i64>,
    pub is_read: bool,
    /// Unix epoch milliseconds (UTC) when the row was inserted.
    pub created_at: i64,
    /// Hex SHA-256 of the dedup tuple, unique across the table.
    pub dedup_key: String,
}

impl NotificationDbModel {
    /// Build an unsaved row from a draft. `id` is assigned by SQLite.
    pub fn from_draft(draft: &NotificationDraft) -> Self {
        Self {
            id: 0,
            recipient_id: draft.recipient,
            sender_id: draft.sender,
            category: draft.gate.as_str().to_string(),
            title: draft.title.clone(),
            message: draft.message.clone(),
            board_id: draft.subject.board_id,
            post_id: draft.subject.post_id,
            comment_id: draft.subject.comment_id,
            meetup_id: draft.subject.meetup_id,
            notice_id: draft.subject.notice_id,
            question_id: draft.subject.question_id,
            is_read: false,
            created_at: now_ms(),
            dedup_key: draft.dedup_key(),
        }
    }

    pub fn subject(&self) -> SubjectRefs {
        SubjectRefs {
            board_id: self.board_id,
            post_id: self.post_id,
            comment_id: self.comment_id,
            meetup_id: self.meetup_id,
            notice_id: self.notice_id,
            question_id: self.question_id,
        }
    }

    pub fn into_record(self) -> Result<NotificationRecord> {
        let gate = NotificationGate::parse(&self.category).ok_or_else(|| {
            Error::validation(format!(
                "notification {} has unknown category '{}'",
                self.id, self.category
            ))
        })?;
        let subject = self.subject();
        Ok(NotificationRecord {
            id: self.id,
            recipient: self.recipient_id,
            sender: self.sender_id,
            gate,
            title: self.title,
            message: self.message,
            subject,
            is_read: self.is_read,
            created_at: ms_to_datetime(self.created_at),
        })
    }
}

//! Domain events that can trigger notifications.
//!
//! Events are built in-process by the board and meetup services after the
//! triggering action has been saved. They carry every reference a handler
//! needs, so handlers never query the board or meetup schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::UserId;

/// Direction of a like toggle. Only [`LikeTransition::Added`] notifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeTransition {
    Added,
    Removed,
}

/// Reminder schedule slot. Each window has its own title, so both windows
/// notify while repeats within one window de-duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum ReminderWindow {
    DayBefore,
    HourBefore,
}

impl ReminderWindow {
    pub fn title(&self) -> &'static str {
        match self {
            Self::DayBefore => "Meetup starts in 24 hours",
            Self::HourBefore => "Meetup starts in 1 hour",
        }
    }

    /// How long before the start this window fires.
    pub fn lead_time(&self) -> chrono::Duration {
        match self {
            Self::DayBefore => chrono::Duration::hours(24),
            Self::HourBefore => chrono::Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentCreated {
    pub board_id: i64,
    pub post_id: i64,
    pub comment_id: i64,
    pub post_author: UserId,
    pub commenter: UserId,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyCreated {
    pub board_id: i64,
    pub post_id: i64,
    /// Id of the reply itself.
    pub comment_id: i64,
    pub parent_comment_author: UserId,
    pub replier: UserId,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionParsed {
    pub board_id: i64,
    pub post_id: i64,
    pub comment_id: i64,
    pub author: UserId,
    /// Raw comment text; `@nickname` tokens are extracted from it.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostLiked {
    pub board_id: i64,
    pub post_id: i64,
    pub post_author: UserId,
    pub post_title: String,
    pub liker: UserId,
    pub transition: LikeTransition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentLiked {
    pub board_id: i64,
    pub post_id: i64,
    pub comment_id: i64,
    pub comment_author: UserId,
    pub liker: UserId,
    pub transition: LikeTransition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetupJoined {
    pub meetup_id: i64,
    pub meetup_title: String,
    pub creator: UserId,
    pub participant: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetupNoticeCreated {
    pub meetup_id: i64,
    pub meetup_title: String,
    pub notice_id: i64,
    pub notice_title: String,
    pub author: UserId,
    /// Current participants; may include the author.
    pub participants: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetupQuestionAsked {
    pub meetup_id: i64,
    pub meetup_title: String,
    pub question_id: i64,
    pub creator: UserId,
    pub asker: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetupQuestionAnswered {
    pub meetup_id: i64,
    pub meetup_title: String,
    pub question_id: i64,
    /// Id of the answering comment.
    pub comment_id: i64,
    pub question_author: UserId,
    pub creator: UserId,
    pub answerer: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetupKicked {
    pub meetup_id: i64,
    pub meetup_title: String,
    pub creator: UserId,
    pub participant: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetupReminder {
    pub meetup_id: i64,
    pub meetup_title: String,
    pub starts_at: DateTime<Utc>,
    pub creator: UserId,
    pub participants: Vec<UserId>,
    pub window: ReminderWindow,
}

/// A user action (or scheduler tick) that may produce notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "kind")]
pub enum DomainEvent {
    CommentCreated(CommentCreated),
    ReplyCreated(ReplyCreated),
    MentionParsed(MentionParsed),
    PostLiked(PostLiked),
    CommentLiked(CommentLiked),
    MeetupJoined(MeetupJoined),
    MeetupNoticeCreated(MeetupNoticeCreated),
    MeetupQuestionAsked(MeetupQuestionAsked),
    MeetupQuestionAnswered(MeetupQuestionAnswered),
    MeetupKicked(MeetupKicked),
    MeetupReminder(MeetupReminder),
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// The user who performed the action; `None` for system events.
    pub fn actor(&self) -> Option<UserId> {
        match self {
            Self::CommentCreated(e) => Some(e.commenter),
            Self::ReplyCreated(e) => Some(e.replier),
            Self::MentionParsed(e) => Some(e.author),
            Self::PostLiked(e) => Some(e.liker),
            Self::CommentLiked(e) => Some(e.liker),
            Self::MeetupJoined(e) => Some(e.participant),
            Self::MeetupNoticeCreated(e) => Some(e.author),
            Self::MeetupQuestionAsked(e) => Some(e.asker),
            Self::MeetupQuestionAnswered(e) => Some(e.answerer),
            Self::MeetupKicked(e) => Some(e.creator),
            Self::MeetupReminder(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_actor() {
        let event = DomainEvent::PostLiked(PostLiked {
            board_id: 1,
            post_id: 2,
            post_author: 3,
            post_title: "Hello".into(),
            liker: 4,
            transition: LikeTransition::Added,
        });
        assert_eq!(event.kind(), "PostLiked");
        assert_eq!(event.actor(), Some(4));

        let reminder = DomainEvent::MeetupReminder(MeetupReminder {
            meetup_id: 1,
            meetup_title: "Picnic".into(),
            starts_at: Utc::now(),
            creator: 1,
            participants: vec![2],
            window: ReminderWindow::HourBefore,
        });
        assert_eq!(reminder.kind(), "MeetupReminder");
        assert_eq!(reminder.actor(), None);
    }

    #[test]
    fn test_event_json_is_tagged_by_kind() {
        let event = DomainEvent::MeetupKicked(MeetupKicked {
            meetup_id: 5,
            meetup_title: "Hike".into(),
            creator: 1,
            participant: 2,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "MeetupKicked");
        assert_eq!(json["meetup_id"], 5);
        let back: DomainEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_reminder_windows_have_distinct_titles() {
        assert_ne!(ReminderWindow::DayBefore.title(), ReminderWindow::HourBefore.title());
        assert_eq!(ReminderWindow::HourBefore.lead_time(), chrono::Duration::hours(1));
    }
}

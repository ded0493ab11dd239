//! Event handlers: recipient resolution and message templating.
//!
//! Handlers are best-effort. A failed dispatch is logged and counted, never
//! returned, so the action that raised the event always succeeds.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::category::{NotificationCategory, NotificationGate};
use super::dispatcher::{DispatchOutcome, NotificationDispatcher};
use super::events::*;
use super::mention::extract_mentions;
use super::record::{NotificationDraft, SubjectRefs, UserId};
use crate::Result;
use crate::database::models::UNKNOWN_DISPLAY_NAME;
use crate::database::repositories::UserDirectory;
use crate::utils::text::truncate_chars;

/// Longest user-supplied text embedded in a notification message.
pub const MAX_EMBEDDED_CHARS: usize = 100;

/// Per-event dispatch counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleSummary {
    pub created: usize,
    pub suppressed: usize,
    pub failed: usize,
}

impl HandleSummary {
    fn record(&mut self, kind: &'static str, result: Result<DispatchOutcome>) {
        match result {
            Ok(DispatchOutcome::Created { .. }) => self.created += 1,
            Ok(DispatchOutcome::Suppressed(_)) => self.suppressed += 1,
            Err(e) => {
                warn!(event = kind, error = %e, "Notification dispatch failed");
                self.failed += 1;
            }
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.suppressed + self.failed
    }
}

/// Translates [`DomainEvent`]s into dispatcher calls.
pub struct NotificationHandlers {
    dispatcher: Arc<NotificationDispatcher>,
    users: Arc<dyn UserDirectory>,
}

impl NotificationHandlers {
    pub fn new(dispatcher: Arc<NotificationDispatcher>, users: Arc<dyn UserDirectory>) -> Self {
        Self { dispatcher, users }
    }

    pub async fn handle(&self, event: &DomainEvent) -> HandleSummary {
        let summary = match event {
            DomainEvent::CommentCreated(e) => self.on_comment_created(e).await,
            DomainEvent::ReplyCreated(e) => self.on_reply_created(e).await,
            DomainEvent::MentionParsed(e) => self.on_mention_parsed(e).await,
            DomainEvent::PostLiked(e) => self.on_post_liked(e).await,
            DomainEvent::CommentLiked(e) => self.on_comment_liked(e).await,
            DomainEvent::MeetupJoined(e) => self.on_meetup_joined(e).await,
            DomainEvent::MeetupNoticeCreated(e) => self.on_notice_created(e).await,
            DomainEvent::MeetupQuestionAsked(e) => self.on_question_asked(e).await,
            DomainEvent::MeetupQuestionAnswered(e) => self.on_question_answered(e).await,
            DomainEvent::MeetupKicked(e) => self.on_kicked(e).await,
            DomainEvent::MeetupReminder(e) => self.on_reminder(e).await,
        };

        debug!(
            event = event.kind(),
            actor = ?event.actor(),
            created = summary.created,
            suppressed = summary.suppressed,
            failed = summary.failed,
            "Event handled"
        );
        summary
    }

    async fn display_name(&self, user_id: UserId) -> String {
        match self.users.display_name(user_id).await {
            Ok(name) => name,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to resolve display name");
                UNKNOWN_DISPLAY_NAME.to_string()
            }
        }
    }

    async fn send(&self, kind: &'static str, summary: &mut HandleSummary, draft: NotificationDraft) {
        summary.record(kind, self.dispatcher.dispatch(draft).await);
    }

    async fn on_comment_created(&self, e: &CommentCreated) -> HandleSummary {
        let mut summary = HandleSummary::default();
        let name = self.display_name(e.commenter).await;
        let draft = NotificationDraft::new(
            e.post_author,
            Some(e.commenter),
            NotificationCategory::Commented,
            "New comment",
            format!(
                "{} commented on your post: {}",
                name,
                truncate_chars(&e.content, MAX_EMBEDDED_CHARS)
            ),
            SubjectRefs::post(e.board_id, e.post_id).with_comment(e.comment_id),
        );
        self.send("CommentCreated", &mut summary, draft).await;
        summary
    }

    /// Replies notify the parent comment's author only, never the post
    /// author.
    async fn on_reply_created(&self, e: &ReplyCreated) -> HandleSummary {
        let mut summary = HandleSummary::default();
        let name = self.display_name(e.replier).await;
        let draft = NotificationDraft::new(
            e.parent_comment_author,
            Some(e.replier),
            NotificationCategory::Commented,
            "New reply",
            format!(
                "{} replied to your comment: {}",
                name,
                truncate_chars(&e.content, MAX_EMBEDDED_CHARS)
            ),
            SubjectRefs::post(e.board_id, e.post_id).with_comment(e.comment_id),
        );
        self.send("ReplyCreated", &mut summary, draft).await;
        summary
    }

    async fn on_mention_parsed(&self, e: &MentionParsed) -> HandleSummary {
        let mut summary = HandleSummary::default();
        let nicknames = extract_mentions(&e.content);
        if nicknames.is_empty() {
            return summary;
        }

        let name = self.display_name(e.author).await;
        let message = format!(
            "{} mentioned you in a comment: {}",
            name,
            truncate_chars(&e.content, MAX_EMBEDDED_CHARS)
        );
        let subject = SubjectRefs::post(e.board_id, e.post_id).with_comment(e.comment_id);

        for nickname in nicknames {
            let recipient = match self.users.resolve_by_nickname(&nickname).await {
                Ok(Some(user_id)) => user_id,
                Ok(None) => {
                    debug!(nickname = %nickname, "Mentioned nickname not found; skipping");
                    continue;
                }
                Err(err) => {
                    warn!(nickname = %nickname, error = %err, "Failed to resolve mention");
                    summary.failed += 1;
                    continue;
                }
            };

            let draft = NotificationDraft::new(
                recipient,
                Some(e.author),
                NotificationCategory::Mentioned,
                "New mention",
                message.clone(),
                subject,
            );
            self.send("MentionParsed", &mut summary, draft).await;
        }
        summary
    }

    async fn on_post_liked(&self, e: &PostLiked) -> HandleSummary {
        let mut summary = HandleSummary::default();
        if e.transition != LikeTransition::Added {
            return summary;
        }

        let name = self.display_name(e.liker).await;
        let draft = NotificationDraft::new(
            e.post_author,
            Some(e.liker),
            NotificationCategory::Liked,
            "New like",
            format!(
                "{} liked your post '{}'.",
                name,
                truncate_chars(&e.post_title, MAX_EMBEDDED_CHARS)
            ),
            SubjectRefs::post(e.board_id, e.post_id),
        );
        self.send("PostLiked", &mut summary, draft).await;
        summary
    }

    async fn on_comment_liked(&self, e: &CommentLiked) -> HandleSummary {
        let mut summary = HandleSummary::default();
        if e.transition != LikeTransition::Added {
            return summary;
        }

        let name = self.display_name(e.liker).await;
        let draft = NotificationDraft::new(
            e.comment_author,
            Some(e.liker),
            NotificationCategory::Liked,
            "New like",
            format!("{} liked your comment.", name),
            SubjectRefs::post(e.board_id, e.post_id).with_comment(e.comment_id),
        );
        self.send("CommentLiked", &mut summary, draft).await;
        summary
    }

    async fn on_meetup_joined(&self, e: &MeetupJoined) -> HandleSummary {
        let mut summary = HandleSummary::default();
        if e.creator == e.participant {
            return summary;
        }

        let name = self.display_name(e.participant).await;
        let draft = NotificationDraft::new(
            e.creator,
            Some(e.participant),
            NotificationGate::Meetup,
            "New participant",
            format!(
                "{} joined your meetup '{}'.",
                name,
                truncate_chars(&e.meetup_title, MAX_EMBEDDED_CHARS)
            ),
            SubjectRefs::meetup(e.meetup_id),
        );
        self.send("MeetupJoined", &mut summary, draft).await;
        summary
    }

    async fn on_notice_created(&self, e: &MeetupNoticeCreated) -> HandleSummary {
        let mut summary = HandleSummary::default();
        let recipients = unique_recipients(e.participants.iter().copied(), Some(e.author));
        if recipients.is_empty() {
            return summary;
        }

        let name = self.display_name(e.author).await;
        let message = format!(
            "{} posted a notice in '{}': {}",
            name,
            truncate_chars(&e.meetup_title, MAX_EMBEDDED_CHARS),
            truncate_chars(&e.notice_title, MAX_EMBEDDED_CHARS)
        );
        let subject = SubjectRefs::meetup(e.meetup_id).with_notice(e.notice_id);

        for recipient in recipients {
            let draft = NotificationDraft::new(
                recipient,
                Some(e.author),
                NotificationGate::Meetup,
                "New notice",
                message.clone(),
                subject,
            );
            self.send("MeetupNoticeCreated", &mut summary, draft).await;
        }
        summary
    }

    async fn on_question_asked(&self, e: &MeetupQuestionAsked) -> HandleSummary {
        let mut summary = HandleSummary::default();
        let name = self.display_name(e.asker).await;
        let draft = NotificationDraft::new(
            e.creator,
            Some(e.asker),
            NotificationGate::Meetup,
            "New question",
            format!(
                "{} asked a question in '{}'.",
                name,
                truncate_chars(&e.meetup_title, MAX_EMBEDDED_CHARS)
            ),
            SubjectRefs::meetup(e.meetup_id).with_question(e.question_id),
        );
        self.send("MeetupQuestionAsked", &mut summary, draft).await;
        summary
    }

    /// The question's author is notified, unless they answered their own
    /// question; then the meetup creator is.
    async fn on_question_answered(&self, e: &MeetupQuestionAnswered) -> HandleSummary {
        let mut summary = HandleSummary::default();
        let recipient = if e.answerer == e.question_author {
            e.creator
        } else {
            e.question_author
        };

        let name = self.display_name(e.answerer).await;
        let draft = NotificationDraft::new(
            recipient,
            Some(e.answerer),
            NotificationGate::Meetup,
            "New answer",
            format!(
                "{} answered a question in '{}'.",
                name,
                truncate_chars(&e.meetup_title, MAX_EMBEDDED_CHARS)
            ),
            SubjectRefs::meetup(e.meetup_id)
                .with_question(e.question_id)
                .with_comment(e.comment_id),
        );
        self.send("MeetupQuestionAnswered", &mut summary, draft).await;
        summary
    }

    async fn on_kicked(&self, e: &MeetupKicked) -> HandleSummary {
        let mut summary = HandleSummary::default();
        let draft = NotificationDraft::new(
            e.participant,
            Some(e.creator),
            NotificationGate::Meetup,
            "Removed from meetup",
            format!(
                "You were removed from '{}'.",
                truncate_chars(&e.meetup_title, MAX_EMBEDDED_CHARS)
            ),
            SubjectRefs::meetup(e.meetup_id),
        );
        self.send("MeetupKicked", &mut summary, draft).await;
        summary
    }

    async fn on_reminder(&self, e: &MeetupReminder) -> HandleSummary {
        let mut summary = HandleSummary::default();
        let recipients = unique_recipients(
            std::iter::once(e.creator).chain(e.participants.iter().copied()),
            None,
        );
        let message = format!(
            "'{}' starts at {}.",
            truncate_chars(&e.meetup_title, MAX_EMBEDDED_CHARS),
            e.starts_at.format("%Y-%m-%d %H:%M UTC")
        );

        for recipient in recipients {
            let draft = NotificationDraft::new(
                recipient,
                None,
                NotificationGate::Meetup,
                e.window.title(),
                message.clone(),
                SubjectRefs::meetup(e.meetup_id),
            );
            self.send("MeetupReminder", &mut summary, draft).await;
        }
        summary
    }
}

/// De-duplicate in first-seen order, dropping `exclude`.
fn unique_recipients(
    users: impl IntoIterator<Item = UserId>,
    exclude: Option<UserId>,
) -> Vec<UserId> {
    let mut seen = HashSet::new();
    users
        .into_iter()
        .filter(|user| Some(*user) != exclude)
        .filter(|user| seen.insert(*user))
        .collect()
}

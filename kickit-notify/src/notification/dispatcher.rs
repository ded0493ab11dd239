//! Notification dispatcher: guard, persist, publish push.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::guard::{DedupGuard, Eligibility, SuppressReason};
use super::record::{NotificationDraft, NotificationRecord};
use crate::Result;
use crate::database::repositories::{CreateOutcome, NotificationRepository, PreferenceRepository};
use crate::queue::{PUSH_TASK_NAME, PushTask, TaskQueue, enqueue_task};

/// What happened to the push side of a created notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum PushStatus {
    Enqueued,
    /// The recipient has push disabled.
    Skipped,
    /// The task queue refused the task; the record still exists.
    EnqueueFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Created {
        record: NotificationRecord,
        push: PushStatus,
    },
    Suppressed(SuppressReason),
}

impl DispatchOutcome {
    pub fn record(&self) -> Option<&NotificationRecord> {
        match self {
            Self::Created { record, .. } => Some(record),
            Self::Suppressed(_) => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

/// Turns drafts into records and push tasks.
///
/// The record write is awaited; the push is only published. Failing to
/// publish never fails the dispatch.
pub struct NotificationDispatcher {
    guard: DedupGuard,
    records: Arc<dyn NotificationRepository>,
    queue: Arc<dyn TaskQueue>,
}

impl NotificationDispatcher {
    pub fn new(
        preferences: Arc<dyn PreferenceRepository>,
        records: Arc<dyn NotificationRepository>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            guard: DedupGuard::new(preferences, records.clone()),
            records,
            queue,
        }
    }

    /// Returns `Err` only when the preference or record store fails.
    pub async fn dispatch(&self, draft: NotificationDraft) -> Result<DispatchOutcome> {
        let push_enabled = match self.guard.evaluate(&draft).await? {
            Eligibility::Allowed { push_enabled } => push_enabled,
            Eligibility::Suppressed(reason) => {
                debug!(
                    recipient = draft.recipient,
                    sender = ?draft.sender,
                    category = %draft.gate,
                    %reason,
                    "Notification suppressed"
                );
                return Ok(DispatchOutcome::Suppressed(reason));
            }
        };

        // The unique dedup index closes the window between the guard's
        // existence check and this insert.
        let record = match self.records.create(&draft).await? {
            CreateOutcome::Created(record) => record,
            CreateOutcome::Duplicate => {
                debug!(recipient = draft.recipient, "Notification lost dedup race; suppressed");
                return Ok(DispatchOutcome::Suppressed(SuppressReason::Duplicate));
            }
        };

        info!(
            notification_id = record.id,
            recipient = record.recipient,
            sender = ?record.sender,
            category = %record.gate,
            "Notification created"
        );

        let push = if push_enabled {
            self.publish_push(&record)
        } else {
            PushStatus::Skipped
        };

        Ok(DispatchOutcome::Created { record, push })
    }

    fn publish_push(&self, record: &NotificationRecord) -> PushStatus {
        let task = PushTask {
            recipient: record.recipient,
            title: record.title.clone(),
            message: record.message.clone(),
            subject: record.subject,
        };

        match enqueue_task(self.queue.as_ref(), PUSH_TASK_NAME, &task) {
            Ok(()) => PushStatus::Enqueued,
            Err(e) => {
                warn!(
                    notification_id = record.id,
                    recipient = record.recipient,
                    error = %e,
                    "Failed to enqueue push task; in-app notification kept"
                );
                PushStatus::EnqueueFailed
            }
        }
    }
}

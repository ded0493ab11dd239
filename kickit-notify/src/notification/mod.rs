//! Notification dispatch and deduplication engine.
//!
//! Flow for every domain action:
//!
//! ```text
//! DomainEvent -> NotificationHandlers -> NotificationDispatcher
//!     -> DedupGuard (may suppress) -> record insert -> push task enqueued
//! ```

pub mod category;
pub mod dispatcher;
pub mod events;
pub mod guard;
pub mod handlers;
pub mod mention;
pub mod preferences;
pub mod record;

pub use category::{NotificationCategory, NotificationGate};
pub use dispatcher::{DispatchOutcome, NotificationDispatcher, PushStatus};
pub use events::{DomainEvent, LikeTransition, ReminderWindow};
pub use guard::{DedupGuard, Eligibility, SuppressReason};
pub use handlers::{HandleSummary, NotificationHandlers};
pub use mention::extract_mentions;
pub use preferences::NotificationPreferences;
pub use record::{NotificationDraft, NotificationRecord, SubjectRefs, UserId};

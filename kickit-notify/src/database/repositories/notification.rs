//! Notification record repository.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::database::models::NotificationDbModel;
use crate::database::retry::retry_on_busy;
use crate::notification::{NotificationDraft, NotificationRecord, UserId};
use crate::{Error, Result};

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Which notifications a list or bulk operation covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationFilter {
    #[default]
    All,
    Unread,
    /// Notifications about a meetup (`meetup_id` set).
    Meetup,
}

impl NotificationFilter {
    fn sql_clause(&self) -> &'static str {
        match self {
            Self::All => "",
            Self::Unread => " AND is_read = FALSE",
            Self::Meetup => " AND meetup_id IS NOT NULL",
        }
    }
}

/// Keyset cursor. Pages are ordered newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    /// Only return notifications with an id strictly below this one.
    pub before_id: Option<i64>,
    pub limit: u32,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            before_id: None,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageCursor {
    pub fn first(limit: u32) -> Self {
        Self {
            before_id: None,
            limit,
        }
    }

    fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationPage {
    pub items: Vec<NotificationRecord>,
    /// `None` on the last page.
    pub next_cursor: Option<PageCursor>,
}

/// Result of an insert that may collide with an existing dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(NotificationRecord),
    /// A row with the same dedup key already exists; nothing was written.
    Duplicate,
}

/// Notification record repository trait.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert a record for `draft` unless its dedup key is already taken.
    async fn create(&self, draft: &NotificationDraft) -> Result<CreateOutcome>;
    async fn exists_with_key(&self, dedup_key: &str) -> Result<bool>;
    async fn get(&self, id: i64) -> Result<NotificationRecord>;

    /// Mark one notification read. Returns false when `id` does not belong
    /// to `recipient`.
    async fn mark_read(&self, id: i64, recipient: UserId) -> Result<bool>;
    /// Mark every matching unread notification read; returns the count.
    async fn mark_all_read(&self, recipient: UserId, filter: NotificationFilter) -> Result<u64>;

    async fn list_by_recipient(
        &self,
        recipient: UserId,
        filter: NotificationFilter,
        cursor: PageCursor,
    ) -> Result<NotificationPage>;
    async fn unread_count(&self, recipient: UserId, filter: NotificationFilter) -> Result<u64>;
}

/// SQLx implementation of NotificationRepository.
pub struct SqlxNotificationRepository {
    pool: SqlitePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn create(&self, draft: &NotificationDraft) -> Result<CreateOutcome> {
        let row = NotificationDbModel::from_draft(draft);

        let inserted: Option<(i64,)> = retry_on_busy("create_notification", || async {
            let id: Option<(i64,)> = sqlx::query_as(
                r#"
                INSERT INTO notification (
                    recipient_id, sender_id, category, title, message,
                    board_id, post_id, comment_id, meetup_id, notice_id, question_id,
                    is_read, created_at, dedup_key
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, FALSE, ?, ?)
                ON CONFLICT(dedup_key) DO NOTHING
                RETURNING id
                "#,
            )
            .bind(row.recipient_id)
            .bind(row.sender_id)
            .bind(&row.category)
            .bind(&row.title)
            .bind(&row.message)
            .bind(row.board_id)
            .bind(row.post_id)
            .bind(row.comment_id)
            .bind(row.meetup_id)
            .bind(row.notice_id)
            .bind(row.question_id)
            .bind(row.created_at)
            .bind(&row.dedup_key)
            .fetch_optional(&self.pool)
            .await?;
            Ok(id)
        })
        .await?;

        match inserted {
            Some((id,)) => {
                let mut row = row;
                row.id = id;
                Ok(CreateOutcome::Created(row.into_record()?))
            }
            None => Ok(CreateOutcome::Duplicate),
        }
    }

    async fn exists_with_key(&self, dedup_key: &str) -> Result<bool> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM notification WHERE dedup_key = ? LIMIT 1")
                .bind(dedup_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn get(&self, id: i64) -> Result<NotificationRecord> {
        sqlx::query_as::<_, NotificationDbModel>("SELECT * FROM notification WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Notification", id.to_string()))?
            .into_record()
    }

    async fn mark_read(&self, id: i64, recipient: UserId) -> Result<bool> {
        let result = retry_on_busy("mark_notification_read", || async {
            Ok(
                sqlx::query("UPDATE notification SET is_read = TRUE WHERE id = ? AND recipient_id = ?")
                    .bind(id)
                    .bind(recipient)
                    .execute(&self.pool)
                    .await?,
            )
        })
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, recipient: UserId, filter: NotificationFilter) -> Result<u64> {
        let sql = format!(
            "UPDATE notification SET is_read = TRUE WHERE recipient_id = ? AND is_read = FALSE{}",
            filter.sql_clause()
        );
        let result = retry_on_busy("mark_all_notifications_read", || async {
            Ok(sqlx::query(&sql).bind(recipient).execute(&self.pool).await?)
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_by_recipient(
        &self,
        recipient: UserId,
        filter: NotificationFilter,
        cursor: PageCursor,
    ) -> Result<NotificationPage> {
        let limit = cursor.effective_limit();
        let sql = format!(
            r#"
            SELECT * FROM notification
            WHERE recipient_id = ?{}{}
            ORDER BY id DESC
            LIMIT ?
            "#,
            filter.sql_clause(),
            if cursor.before_id.is_some() { " AND id < ?" } else { "" },
        );

        let mut query = sqlx::query_as::<_, NotificationDbModel>(&sql).bind(recipient);
        if let Some(before_id) = cursor.before_id {
            query = query.bind(before_id);
        }
        // One extra row tells us whether another page exists.
        let mut rows = query.bind(i64::from(limit) + 1).fetch_all(&self.pool).await?;

        let has_more = rows.len() > limit as usize;
        rows.truncate(limit as usize);

        let items = rows
            .into_iter()
            .map(NotificationDbModel::into_record)
            .collect::<Result<Vec<_>>>()?;

        let next_cursor = match items.last() {
            Some(last) if has_more => Some(PageCursor {
                before_id: Some(last.id),
                limit,
            }),
            _ => None,
        };

        Ok(NotificationPage { items, next_cursor })
    }

    async fn unread_count(&self, recipient: UserId, filter: NotificationFilter) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM notification WHERE recipient_id = ? AND is_read = FALSE{}",
            filter.sql_clause()
        );
        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(recipient)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

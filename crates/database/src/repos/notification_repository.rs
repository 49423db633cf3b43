//! Repository for offline new-message notifications.

use crate::entities::Notification;
use crate::errors::StoreResult;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

#[derive(Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a new-message notification for a member who was not
    /// subscribed to the chat room when the message arrived.
    pub async fn create_new_message(
        &self,
        user_id: i64,
        chat_public_id: &str,
        message_public_id: &str,
        sender_id: i64,
    ) -> StoreResult<Notification> {
        let now = chrono::Utc::now().to_rfc3339();
        let id = sqlx::query(
            "INSERT INTO notifications (user_id, chat_public_id, message_public_id, sender_id, read, created_at)
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(user_id)
        .bind(chat_public_id)
        .bind(message_public_id)
        .bind(sender_id)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Notification {
            id,
            user_id,
            chat_public_id: chat_public_id.to_string(),
            message_public_id: message_public_id.to_string(),
            sender_id,
            read: false,
            created_at: now,
        })
    }

    pub async fn list_unread(&self, user_id: i64) -> StoreResult<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT id, user_id, chat_public_id, message_public_id, sender_id, read, created_at
             FROM notifications WHERE user_id = ? AND read = 0 ORDER BY id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(notification_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn mark_all_read(&self, user_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = ? AND read = 0")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification, sqlx::Error> {
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        chat_public_id: row.try_get("chat_public_id")?,
        message_public_id: row.try_get("message_public_id")?,
        sender_id: row.try_get("sender_id")?,
        read: row.try_get("read")?,
        created_at: row.try_get("created_at")?,
    })
}

//! Repository for message persistence and seen-state tracking.

use crate::entities::{CreateMessageRequest, Message, MessageType, UserSummary};
use crate::errors::{StoreError, StoreResult};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::HashMap;
use tracing::info;

#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a message and bump the owning chat's latest-message pointer
    /// and activity timestamp in the same transaction. The seen-by set
    /// starts empty; even the sender acknowledges via `mark_seen`.
    pub async fn create(&self, request: CreateMessageRequest) -> StoreResult<Message> {
        let public_id = cuid2::create_id();
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let message_id = sqlx::query(
            "INSERT INTO messages (public_id, chat_id, sender_id, content, message_type, media_url, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&public_id)
        .bind(request.chat_id)
        .bind(request.sender_id)
        .bind(&request.content)
        .bind(request.message_type.as_str())
        .bind(&request.media_url)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("UPDATE chats SET latest_message_id = ?, updated_at = ? WHERE id = ?")
            .bind(message_id)
            .bind(&now)
            .bind(request.chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(message_id, public_id = %public_id, chat_id = request.chat_id, "persisted message");

        let message = self.find_by_id(message_id).await?;
        message.ok_or(StoreError::NotFound)
    }

    pub async fn find_by_id(&self, message_id: i64) -> StoreResult<Option<Message>> {
        let row = sqlx::query(&format!(
            "{MESSAGE_SELECT} WHERE m.id = ?"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut message = message_from_row(&row)?;
                message.seen_by = self.seen_by(message.id).await?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    pub async fn find_by_public_id(&self, public_id: &str) -> StoreResult<Option<Message>> {
        let row = sqlx::query(&format!(
            "{MESSAGE_SELECT} WHERE m.public_id = ?"
        ))
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut message = message_from_row(&row)?;
                message.seen_by = self.seen_by(message.id).await?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    /// Full history of a chat in creation order, with seen-by sets filled in
    /// from one batched query.
    pub async fn list_for_chat(&self, chat_id: i64) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "{MESSAGE_SELECT} WHERE m.chat_id = ? ORDER BY m.id ASC"
        ))
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let seen_rows = sqlx::query(
            "SELECT ms.message_id, ms.user_id
             FROM message_seen ms
             JOIN messages m ON m.id = ms.message_id
             WHERE m.chat_id = ?
             ORDER BY ms.message_id ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        let mut seen_map: HashMap<i64, Vec<i64>> = HashMap::new();
        for row in &seen_rows {
            let message_id: i64 = row.try_get("message_id")?;
            let user_id: i64 = row.try_get("user_id")?;
            seen_map.entry(message_id).or_default().push(user_id);
        }

        for message in &mut messages {
            if let Some(seen) = seen_map.remove(&message.id) {
                message.seen_by = seen;
            }
        }

        Ok(messages)
    }

    /// Record that a user has seen a message. Returns `true` when the row
    /// was newly inserted, `false` when the user had already seen it, so
    /// callers can suppress duplicate broadcasts.
    pub async fn mark_seen(&self, message_id: i64, user_id: i64) -> StoreResult<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO message_seen (message_id, user_id, seen_at) VALUES (?, ?, ?)",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn seen_by(&self, message_id: i64) -> StoreResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM message_seen WHERE message_id = ? ORDER BY user_id ASC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

const MESSAGE_SELECT: &str = "SELECT m.id, m.public_id, m.chat_id, m.content, m.message_type,
        m.media_url, m.created_at,
        c.public_id AS chat_public_id,
        u.id AS sender_id, u.username AS sender_username, u.avatar_url AS sender_avatar_url
 FROM messages m
 JOIN chats c ON c.id = m.chat_id
 JOIN users u ON u.id = m.sender_id";

fn message_from_row(row: &SqliteRow) -> Result<Message, sqlx::Error> {
    let message_type: String = row.try_get("message_type")?;
    Ok(Message {
        id: row.try_get("id")?,
        public_id: row.try_get("public_id")?,
        chat_id: row.try_get("chat_id")?,
        chat_public_id: row.try_get("chat_public_id")?,
        sender: UserSummary {
            id: row.try_get("sender_id")?,
            username: row.try_get("sender_username")?,
            avatar_url: row.try_get("sender_avatar_url")?,
        },
        content: row.try_get("content")?,
        message_type: MessageType::from(message_type.as_str()),
        media_url: row.try_get("media_url")?,
        created_at: row.try_get("created_at")?,
        seen_by: Vec::new(),
    })
}

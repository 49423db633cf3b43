//! Repository for chat and membership data access operations.
//!
//! Multi-step lifecycle mutations (create with members, leave with admin
//! transfer) run inside a single transaction so an invariant violation
//! aborts the whole mutation instead of partially applying it.

use crate::entities::{Chat, ChatMemberRecord};
use crate::errors::{StoreError, StoreResult};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::info;

#[derive(Clone)]
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_public_id(&self, public_id: &str) -> StoreResult<Option<Chat>> {
        let row = sqlx::query(
            "SELECT id, public_id, name, is_group, admin_user_id, icon_url, latest_message_id,
                    created_at, updated_at
             FROM chats WHERE public_id = ?",
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| chat_from_row(&row)).transpose()?)
    }

    pub async fn find_by_rowid(&self, chat_id: i64) -> StoreResult<Option<Chat>> {
        let row = sqlx::query(
            "SELECT id, public_id, name, is_group, admin_user_id, icon_url, latest_message_id,
                    created_at, updated_at
             FROM chats WHERE id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| chat_from_row(&row)).transpose()?)
    }

    pub async fn find_by_direct_key(&self, key: &str) -> StoreResult<Option<Chat>> {
        let row = sqlx::query(
            "SELECT id, public_id, name, is_group, admin_user_id, icon_url, latest_message_id,
                    created_at, updated_at
             FROM chats WHERE direct_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| chat_from_row(&row)).transpose()?)
    }

    /// Chats the user belongs to, most recently active first.
    pub async fn list_for_user(&self, user_id: i64) -> StoreResult<Vec<Chat>> {
        let rows = sqlx::query(
            "SELECT c.id, c.public_id, c.name, c.is_group, c.admin_user_id, c.icon_url,
                    c.latest_message_id, c.created_at, c.updated_at
             FROM chats c
             JOIN chat_members cm ON c.id = cm.chat_id
             WHERE cm.user_id = ?
             ORDER BY c.updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(chat_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Membership rows in stored member order (insertion order), the order
    /// used for deterministic admin transfer.
    pub async fn members(&self, chat_id: i64) -> StoreResult<Vec<ChatMemberRecord>> {
        let rows = sqlx::query(
            "SELECT id, chat_id, user_id, joined_at
             FROM chat_members WHERE chat_id = ? ORDER BY id ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| -> Result<ChatMemberRecord, sqlx::Error> {
                Ok(ChatMemberRecord {
                    id: row.try_get("id")?,
                    chat_id: row.try_get("chat_id")?,
                    user_id: row.try_get("user_id")?,
                    joined_at: row.try_get("joined_at")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn member_user_ids(&self, chat_id: i64) -> StoreResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM chat_members WHERE chat_id = ? ORDER BY id ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn is_member(&self, chat_id: i64, user_id: i64) -> StoreResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM chat_members WHERE chat_id = ? AND user_id = ?")
                .bind(chat_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Create a direct chat with exactly two members. The UNIQUE constraint
    /// on `direct_key` rejects a concurrent duplicate; callers detect the
    /// violation and re-read the winner.
    pub async fn create_direct(&self, user_a: i64, user_b: i64, key: &str) -> StoreResult<Chat> {
        let public_id = cuid2::create_id();
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let chat_id = sqlx::query(
            "INSERT INTO chats (public_id, name, is_group, admin_user_id, direct_key, created_at, updated_at)
             VALUES (?, NULL, 0, NULL, ?, ?, ?)",
        )
        .bind(&public_id)
        .bind(key)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for user_id in [user_a, user_b] {
            sqlx::query("INSERT INTO chat_members (chat_id, user_id, joined_at) VALUES (?, ?, ?)")
                .bind(chat_id)
                .bind(user_id)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(chat_id, public_id = %public_id, user_a, user_b, "created direct chat");

        Ok(Chat {
            id: chat_id,
            public_id,
            name: None,
            is_group: false,
            admin_user_id: None,
            icon_url: None,
            latest_message_id: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Create a group chat. `member_ids` must already include the admin.
    pub async fn create_group(
        &self,
        name: &str,
        member_ids: &[i64],
        admin_id: i64,
    ) -> StoreResult<Chat> {
        let public_id = cuid2::create_id();
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let chat_id = sqlx::query(
            "INSERT INTO chats (public_id, name, is_group, admin_user_id, direct_key, created_at, updated_at)
             VALUES (?, ?, 1, ?, NULL, ?, ?)",
        )
        .bind(&public_id)
        .bind(name)
        .bind(admin_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for user_id in member_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO chat_members (chat_id, user_id, joined_at) VALUES (?, ?, ?)",
            )
            .bind(chat_id)
            .bind(user_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(chat_id, public_id = %public_id, admin_id, members = member_ids.len(), "created group chat");

        Ok(Chat {
            id: chat_id,
            public_id,
            name: Some(name.to_string()),
            is_group: true,
            admin_user_id: Some(admin_id),
            icon_url: None,
            latest_message_id: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub async fn rename(&self, chat_id: i64, name: &str) -> StoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query("UPDATE chats SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(&now)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Add a member (idempotent).
    pub async fn add_member(&self, chat_id: i64, user_id: i64) -> StoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT OR IGNORE INTO chat_members (chat_id, user_id, joined_at) VALUES (?, ?, ?)",
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Remove one member, deleting the chat when it was the last one.
    pub async fn apply_remove(
        &self,
        chat_id: i64,
        user_id: i64,
        delete_chat: bool,
    ) -> StoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM chat_members WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        if delete_chat {
            sqlx::query("DELETE FROM chats WHERE id = ?")
                .bind(chat_id)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
                .bind(&now)
                .bind(chat_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(chat_id, user_id, delete_chat, "removed chat member");
        Ok(())
    }

    /// Apply a leave: remove the member, optionally hand the admin role to
    /// `new_admin`, or delete the chat when the leaver was the last member.
    pub async fn apply_leave(
        &self,
        chat_id: i64,
        user_id: i64,
        new_admin: Option<i64>,
        delete_chat: bool,
    ) -> StoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM chat_members WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        if delete_chat {
            sqlx::query("DELETE FROM chats WHERE id = ?")
                .bind(chat_id)
                .execute(&mut *tx)
                .await?;
        } else {
            if let Some(admin_id) = new_admin {
                sqlx::query("UPDATE chats SET admin_user_id = ? WHERE id = ?")
                    .bind(admin_id)
                    .bind(chat_id)
                    .execute(&mut *tx)
                    .await?;
            }
            sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
                .bind(&now)
                .bind(chat_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(chat_id, user_id, ?new_admin, delete_chat, "applied chat leave");
        Ok(())
    }
}

fn chat_from_row(row: &SqliteRow) -> Result<Chat, sqlx::Error> {
    Ok(Chat {
        id: row.try_get("id")?,
        public_id: row.try_get("public_id")?,
        name: row.try_get("name")?,
        is_group: row.try_get("is_group")?,
        admin_user_id: row.try_get("admin_user_id")?,
        icon_url: row.try_get("icon_url")?,
        latest_message_id: row.try_get("latest_message_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

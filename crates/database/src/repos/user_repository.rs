//! Repository for user data access operations.

use crate::entities::{CreateUserRequest, PresenceStatus, User, UserSummary};
use crate::errors::StoreResult;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::info;

/// Repository for user database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Find a user by the opaque external auth subject.
    pub async fn find_by_subject(&self, subject: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, subject, username, avatar_url, status, last_seen, created_at, updated_at
             FROM users WHERE subject = ?",
        )
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| user_from_row(&row)).transpose()?)
    }

    pub async fn find_by_id(&self, user_id: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, subject, username, avatar_url, status, last_seen, created_at, updated_at
             FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| user_from_row(&row)).transpose()?)
    }

    pub async fn summary(&self, user_id: i64) -> StoreResult<Option<UserSummary>> {
        let row = sqlx::query("SELECT id, username, avatar_url FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|row| -> Result<UserSummary, sqlx::Error> {
                Ok(UserSummary {
                    id: row.try_get("id")?,
                    username: row.try_get("username")?,
                    avatar_url: row.try_get("avatar_url")?,
                })
            })
            .transpose()?)
    }

    /// Persist a presence transition. Only the presence registry calls this.
    pub async fn update_presence(
        &self,
        user_id: i64,
        status: PresenceStatus,
        last_seen: &str,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE users SET status = ?, last_seen = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(last_seen)
            .bind(last_seen)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Create a user row. Registration is an external concern; this exists
    /// for seeding and tests.
    pub async fn create(&self, request: &CreateUserRequest) -> StoreResult<User> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO users (subject, username, avatar_url, status, last_seen, created_at, updated_at)
             VALUES (?, ?, ?, 'offline', ?, ?, ?)",
        )
        .bind(&request.subject)
        .bind(&request.username)
        .bind(&request.avatar_url)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let user_id = result.last_insert_rowid();
        info!(user_id, subject = %request.subject, "created user");

        Ok(User {
            id: user_id,
            subject: request.subject.clone(),
            username: request.username.clone(),
            avatar_url: request.avatar_url.clone(),
            status: PresenceStatus::Offline,
            last_seen: now.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(User {
        id: row.try_get("id")?,
        subject: row.try_get("subject")?,
        username: row.try_get("username")?,
        avatar_url: row.try_get("avatar_url")?,
        status: PresenceStatus::from(status.as_str()),
        last_seen: row.try_get("last_seen")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

//! Chat entity definitions

use serde::{Deserialize, Serialize};

/// Chat row. A direct chat has exactly two members, no name, and no admin; a
/// group chat has a name and, while it has members, exactly one admin who is
/// a current member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub public_id: String,
    pub name: Option<String>,
    pub is_group: bool,
    pub admin_user_id: Option<i64>,
    pub icon_url: Option<String>,
    pub latest_message_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Chat {
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_user_id == Some(user_id)
    }
}

/// Membership row. The autoincrement `id` is the stored member order used
/// for deterministic admin transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMemberRecord {
    pub id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    pub joined_at: String,
}

/// Canonical dedup key for a direct chat between two users, independent of
/// which side initiates.
pub fn direct_key(user_a: i64, user_b: i64) -> String {
    let (lo, hi) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    format!("{lo}:{hi}")
}

//! Unread-notification entity definitions

use serde::{Deserialize, Serialize};

/// Unread-badge row written for chat members that were not subscribed to the
/// room when a message arrived. This is the only offline artefact the
/// delivery engine produces; the message itself lives in `messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub chat_public_id: String,
    pub message_public_id: String,
    pub sender_id: i64,
    pub read: bool,
    pub created_at: String,
}

//! Message entity definitions

use serde::{Deserialize, Serialize};

use super::user::UserSummary;

/// Message as returned to callers: the stored row joined with a sender
/// summary plus the seen-by set. Immutable after creation except for
/// seen-by growth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub public_id: String,
    pub chat_id: i64,
    pub chat_public_id: String,
    pub sender: UserSummary,
    pub content: Option<String>,
    pub message_type: MessageType,
    pub media_url: Option<String>,
    pub created_at: String,
    pub seen_by: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: Option<String>,
    pub message_type: MessageType,
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Document,
    Audio,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Document => "document",
            MessageType::Audio => "audio",
        }
    }

    /// Non-text messages must carry a media reference.
    pub fn requires_media(&self) -> bool {
        !matches!(self, MessageType::Text)
    }
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        match s {
            "image" => MessageType::Image,
            "video" => MessageType::Video,
            "document" => MessageType::Document,
            "audio" => MessageType::Audio,
            _ => MessageType::Text,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Message endpoints: sending goes through the delivery engine so REST
//! sends fan out exactly like socket traffic.

use crate::{auth::CurrentUser, error::GatewayResult, state::GatewayState};
use axum::{
    extract::{Path, State},
    Json,
};
use parley_database::entities::{Message, MessageType};
use parley_realtime::OutgoingMessage;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub chat_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default = "default_message_type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub media_url: Option<String>,
}

fn default_message_type() -> MessageType {
    MessageType::Text
}

/// `POST /api/messages`: persist and deliver a message.
pub async fn send_message(
    State(state): State<GatewayState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<SendMessageRequest>,
) -> GatewayResult<Json<Message>> {
    let message = state
        .delivery
        .send(
            user.id,
            OutgoingMessage {
                chat_public_id: request.chat_id,
                content: request.content,
                message_type: request.message_type,
                media_url: request.media_url,
            },
        )
        .await?;
    Ok(Json(message))
}

/// `GET /api/messages/:chat_id`: full history of a chat the caller
/// belongs to, oldest first, seen-by sets included.
pub async fn list_messages(
    State(state): State<GatewayState>,
    CurrentUser(user): CurrentUser,
    Path(chat_id): Path<String>,
) -> GatewayResult<Json<Vec<Message>>> {
    let chat = state.lifecycle.chat_for_member(user.id, &chat_id).await?;
    let messages = state.messages.list_for_chat(chat.id).await?;
    Ok(Json(messages))
}

/// `PUT /api/messages/seen/:message_id`: mark one message seen.
pub async fn mark_seen(
    State(state): State<GatewayState>,
    CurrentUser(user): CurrentUser,
    Path(message_id): Path<String>,
) -> GatewayResult<()> {
    state.delivery.mark_seen(user.id, &message_id).await?;
    Ok(())
}

//! REST route handlers.

pub mod chat;
pub mod message;
pub mod notification;

use crate::state::GatewayState;
use axum::{
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;

pub fn create_rest_routes() -> Router<GatewayState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/chats", post(chat::access_chat).get(chat::list_chats))
        .route("/api/chats/group", post(chat::create_group))
        .route("/api/chats/group/:chat_id", get(chat::get_chat))
        .route("/api/chats/rename", put(chat::rename_chat))
        .route("/api/chats/group/add", put(chat::add_member))
        .route("/api/chats/group/remove", put(chat::remove_member))
        .route("/api/chats/leave/:chat_id", put(chat::leave_chat))
        .route("/api/messages", post(message::send_message))
        .route("/api/messages/:chat_id", get(message::list_messages))
        .route("/api/messages/seen/:message_id", put(message::mark_seen))
        .route(
            "/api/notifications",
            get(notification::list_notifications),
        )
        .route("/api/notifications/read", put(notification::mark_all_read))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

//! Wire events exchanged over the realtime transport.
//!
//! Both directions serialize as `{"type": "...", "data": {...}}` so the
//! browser client can switch on the event name.

use parley_database::entities::{Message, Notification, PresenceStatus, UserSummary};
use serde::{Deserialize, Serialize};

/// Events a connected client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientEvent {
    /// Bind this connection to a user session and bring it online.
    #[serde(rename = "setup")]
    Setup,

    /// Subscribe to a chat room for live delivery.
    #[serde(rename = "join room")]
    JoinRoom { chat_id: String },

    /// Unsubscribe from a chat room.
    #[serde(rename = "leave room")]
    LeaveRoom { chat_id: String },

    #[serde(rename = "typing")]
    Typing { chat_id: String },

    #[serde(rename = "stop typing")]
    StopTyping { chat_id: String },

    /// Acknowledge that the user has seen a message.
    #[serde(rename = "message seen")]
    MessageSeen {
        message_id: String,
        #[serde(default)]
        chat_id: Option<String>,
    },
}

/// Events pushed to connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    /// Confirms that setup completed and the session is live.
    #[serde(rename = "connected")]
    Connected,

    /// A new message in a room this connection is subscribed to.
    #[serde(rename = "message received")]
    MessageReceived(Message),

    /// A message while the recipient was not subscribed to its room.
    #[serde(rename = "new message notification")]
    NewMessageNotification(Notification),

    #[serde(rename = "typing")]
    Typing(TypingPayload),

    #[serde(rename = "stop typing")]
    StopTyping(TypingPayload),

    /// Seen-set growth, fanned out to the message's room.
    #[serde(rename = "message seen")]
    MessageSeen(SeenPayload),

    #[serde(rename = "user presence update")]
    PresenceUpdate(PresencePayload),

    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TypingPayload {
    pub chat_id: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeenPayload {
    pub chat_id: String,
    pub message_id: String,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresencePayload {
    pub user_id: i64,
    pub status: PresenceStatus,
    pub last_seen: String,
}

/// Where the delivery engine routes one recipient's copy of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    /// The recipient is subscribed to the room; deliver in room order.
    RoomBroadcast { chat_id: i64 },
    /// The recipient is a member but not subscribed; notify out of band.
    DirectNotification { user_id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_parse_wire_names() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type": "join room", "data": {"chat_id": "abc"}}"#).unwrap();
        assert!(matches!(event, ClientEvent::JoinRoom { chat_id } if chat_id == "abc"));

        let event: ClientEvent = serde_json::from_str(r#"{"type": "setup"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Setup));
    }

    #[test]
    fn server_events_serialize_tagged() {
        let event = ServerEvent::PresenceUpdate(PresencePayload {
            user_id: 7,
            status: PresenceStatus::Online,
            last_seen: "2026-01-01T00:00:00Z".to_string(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "user presence update");
        assert_eq!(value["data"]["user_id"], 7);
    }
}

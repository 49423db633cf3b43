//! WebSocket transport: parses client events off the socket and drives the
//! realtime context. Outbound events queue on an unbounded channel that a
//! writer task drains, so nothing in the session core waits on socket I/O.

use crate::state::GatewayState;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use parley_database::entities::User;
use parley_realtime::{ClientEvent, ConnectionHandle, RealtimeError, ServerEvent};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub fn create_websocket_routes() -> Router<GatewayState> {
    Router::new().route("/ws", get(websocket_handler))
}

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    subject: String,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WebSocketQuery>,
    State(state): State<GatewayState>,
) -> Result<Response, StatusCode> {
    let user = state
        .users
        .find_by_subject(&params.subject)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(socket: WebSocket, state: GatewayState, user: User) {
    let (mut ws_sender, mut receiver) = socket.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let writer_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(error) => {
                    warn!(%error, "failed to serialize outbound event");
                    continue;
                }
            };
            if ws_sender.send(WsMessage::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // The session only comes alive once the client sends its setup event.
    let mut connection: Option<ConnectionHandle> = None;

    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let event: ClientEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(error) => {
                debug!(%error, "ignoring malformed client event");
                let _ = out_tx.send(ServerEvent::Error {
                    message: "malformed event".to_string(),
                });
                continue;
            }
        };

        if let Err(error) = dispatch(&state, &user, &out_tx, &mut connection, event).await {
            let _ = out_tx.send(ServerEvent::Error {
                message: error.to_string(),
            });
        }
    }

    // Teardown runs before the handler returns so no event can be routed
    // to this connection afterwards.
    if let Some(handle) = connection {
        state.realtime.disconnect(user.id, handle.id).await;
    }
    writer_task.abort();
}

async fn dispatch(
    state: &GatewayState,
    user: &User,
    out_tx: &mpsc::UnboundedSender<ServerEvent>,
    connection: &mut Option<ConnectionHandle>,
    event: ClientEvent,
) -> Result<(), RealtimeError> {
    if let ClientEvent::Setup = event {
        if connection.is_none() {
            let handle = state.realtime.connect(user.id, out_tx.clone()).await?;
            *connection = Some(handle);
        }
        return Ok(());
    }

    let Some(handle) = connection.as_ref() else {
        return Err(RealtimeError::validation("setup required first"));
    };

    match event {
        ClientEvent::Setup => {}
        ClientEvent::JoinRoom { chat_id } => {
            state.realtime.join_chat(handle, &chat_id).await?;
        }
        ClientEvent::LeaveRoom { chat_id } => {
            state.realtime.leave_chat(handle, &chat_id).await?;
        }
        ClientEvent::Typing { chat_id } => {
            state.realtime.start_typing(user.id, &chat_id).await?;
        }
        ClientEvent::StopTyping { chat_id } => {
            state.realtime.stop_typing(user.id, &chat_id).await?;
        }
        ClientEvent::MessageSeen { message_id, .. } => {
            state.delivery.mark_seen(user.id, &message_id).await?;
        }
    }
    Ok(())
}

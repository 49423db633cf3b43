//! Connection handles: the bridge between session state and a live socket.

use crate::events::ServerEvent;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// One live transport connection. Events pushed here are queued on the
/// connection's outbound channel; a writer task owned by the transport
/// drains the queue onto the socket, so pushing never blocks on I/O.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: i64,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(user_id: i64, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            sender,
        }
    }

    /// Queue an event for this connection. A closed channel means the
    /// socket is gone; the event is dropped and the teardown path will
    /// clean the registries up.
    pub fn push(&self, event: ServerEvent) {
        if self.sender.send(event).is_err() {
            warn!(connection_id = %self.id, user_id = self.user_id, "dropped event for closed connection");
        }
    }
}

//! Room membership table: which live connections are subscribed to which
//! chat rooms. Runtime subscription state only; durable chat membership
//! lives in the store.

use crate::connection::{ConnectionHandle, ConnectionId};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Clone, Default)]
pub struct RoomMembershipTable {
    inner: Arc<Mutex<HashMap<i64, HashMap<ConnectionId, ConnectionHandle>>>>,
}

impl RoomMembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a room. Re-joining is idempotent.
    pub async fn join(&self, chat_id: i64, handle: ConnectionHandle) {
        let mut inner = self.inner.lock().await;
        inner.entry(chat_id).or_default().insert(handle.id, handle);
        debug!(chat_id, "connection joined room");
    }

    pub async fn leave(&self, chat_id: i64, connection_id: ConnectionId) {
        let mut inner = self.inner.lock().await;
        if let Some(room) = inner.get_mut(&chat_id) {
            room.remove(&connection_id);
            if room.is_empty() {
                inner.remove(&chat_id);
            }
        }
    }

    /// Snapshot of the room's subscribed connections.
    pub async fn subscribers(&self, chat_id: i64) -> Vec<ConnectionHandle> {
        self.inner
            .lock()
            .await
            .get(&chat_id)
            .map(|room| room.values().cloned().collect())
            .unwrap_or_default()
    }

    /// User ids with at least one connection subscribed to the room.
    pub async fn subscribed_user_ids(&self, chat_id: i64) -> HashSet<i64> {
        self.inner
            .lock()
            .await
            .get(&chat_id)
            .map(|room| room.values().map(|handle| handle.user_id).collect())
            .unwrap_or_default()
    }

    /// Remove a connection from every room it is in. Part of connection
    /// teardown; runs before the presence edge is evaluated.
    pub async fn drop_connection(&self, connection_id: ConnectionId) {
        let mut inner = self.inner.lock().await;
        inner.retain(|_, room| {
            room.remove(&connection_id);
            !room.is_empty()
        });
    }

    /// Evict all of a user's connections from one room. Applied when the
    /// user is removed from the chat so they stop receiving its traffic
    /// immediately.
    pub async fn force_unsubscribe(&self, chat_id: i64, user_id: i64) {
        let mut inner = self.inner.lock().await;
        if let Some(room) = inner.get_mut(&chat_id) {
            room.retain(|_, handle| handle.user_id != user_id);
            if room.is_empty() {
                inner.remove(&chat_id);
            }
        }
        debug!(chat_id, user_id, "force-unsubscribed user from room");
    }

    /// Drop a room entirely, evicting every subscriber. Applied when the
    /// chat is deleted.
    pub async fn drop_room(&self, chat_id: i64) {
        self.inner.lock().await.remove(&chat_id);
    }
}

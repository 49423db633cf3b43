//! Presence registry: live connections per user and online/offline edges.

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::events::{PresencePayload, ServerEvent};
use parley_database::entities::PresenceStatus;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;

/// Decides which connections receive a presence update.
///
/// The default scope fans presence out to every live connection, which is
/// what small deployments want. A contact-list scoped implementation can
/// replace it without touching the registry.
pub trait PresenceScope: Send + Sync {
    fn recipients(
        &self,
        subject_user_id: i64,
        all_connections: Vec<ConnectionHandle>,
    ) -> Vec<ConnectionHandle>;
}

/// Fan presence changes out to every live connection, including the
/// subject's own.
#[derive(Debug, Default, Clone, Copy)]
pub struct BroadcastToAll;

impl PresenceScope for BroadcastToAll {
    fn recipients(
        &self,
        _subject_user_id: i64,
        all_connections: Vec<ConnectionHandle>,
    ) -> Vec<ConnectionHandle> {
        all_connections
    }
}

/// Tracks which users have live connections. A user is online while they
/// have at least one registered connection; only the 0-to-1 and 1-to-0
/// transitions are observable outside the registry.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<Mutex<HashMap<i64, HashMap<ConnectionId, ConnectionHandle>>>>,
}

/// Outcome of a register/unregister call: whether the user's online state
/// flipped, and the payload to broadcast when it did.
#[derive(Debug, Clone)]
pub struct PresenceTransition {
    pub user_id: i64,
    pub status: PresenceStatus,
    pub last_seen: String,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns the online transition when this is
    /// the user's first live connection, `None` otherwise.
    pub async fn register(&self, handle: ConnectionHandle) -> Option<PresenceTransition> {
        let mut inner = self.inner.lock().await;
        let connections = inner.entry(handle.user_id).or_default();
        let was_offline = connections.is_empty();
        let user_id = handle.user_id;
        connections.insert(handle.id, handle);

        debug!(user_id, total = connections.len(), "registered connection");

        was_offline.then(|| PresenceTransition {
            user_id,
            status: PresenceStatus::Online,
            last_seen: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Drop a connection. Returns the offline transition when this was the
    /// user's last live connection, `None` otherwise.
    pub async fn unregister(
        &self,
        user_id: i64,
        connection_id: ConnectionId,
    ) -> Option<PresenceTransition> {
        let mut inner = self.inner.lock().await;
        let Some(connections) = inner.get_mut(&user_id) else {
            return None;
        };
        if connections.remove(&connection_id).is_none() {
            return None;
        }

        if connections.is_empty() {
            inner.remove(&user_id);
            debug!(user_id, "user went offline");
            return Some(PresenceTransition {
                user_id,
                status: PresenceStatus::Offline,
                last_seen: chrono::Utc::now().to_rfc3339(),
            });
        }
        None
    }

    pub async fn is_online(&self, user_id: i64) -> bool {
        self.inner.lock().await.contains_key(&user_id)
    }

    /// Whether the user has a live connection other than the given one.
    pub async fn is_online_elsewhere(&self, user_id: i64, connection_id: ConnectionId) -> bool {
        self.inner
            .lock()
            .await
            .get(&user_id)
            .map(|connections| connections.keys().any(|id| *id != connection_id))
            .unwrap_or(false)
    }

    /// Snapshot of all live connections for one user.
    pub async fn connections_for(&self, user_id: i64) -> Vec<ConnectionHandle> {
        self.inner
            .lock()
            .await
            .get(&user_id)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every live connection.
    pub async fn all_connections(&self) -> Vec<ConnectionHandle> {
        self.inner
            .lock()
            .await
            .values()
            .flat_map(|connections| connections.values().cloned())
            .collect()
    }
}

impl PresenceTransition {
    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::PresenceUpdate(PresencePayload {
            user_id: self.user_id,
            status: self.status,
            last_seen: self.last_seen.clone(),
        })
    }
}

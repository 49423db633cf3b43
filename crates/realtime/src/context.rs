//! Realtime context: the session surface the transport layer talks to.
//!
//! Owns the in-memory registries and wires connect, disconnect, room
//! subscription and typing into them. Message traffic goes through the
//! delivery engine instead.

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::errors::{RealtimeError, RealtimeResult};
use crate::events::{ServerEvent, TypingPayload};
use crate::presence::{BroadcastToAll, PresenceRegistry, PresenceScope, PresenceTransition};
use crate::rooms::RoomMembershipTable;
use crate::store_ops::{read_with_retry, with_timeout};
use crate::typing::TypingCoordinator;
use parley_database::entities::Chat;
use parley_database::repos::{ChatRepository, UserRepository};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct RealtimeContext {
    presence: PresenceRegistry,
    rooms: RoomMembershipTable,
    typing: TypingCoordinator,
    scope: Arc<dyn PresenceScope>,
    users: UserRepository,
    chats: ChatRepository,
    store_timeout: Duration,
}

impl RealtimeContext {
    pub fn new(
        users: UserRepository,
        chats: ChatRepository,
        typing_ttl: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            presence: PresenceRegistry::new(),
            rooms: RoomMembershipTable::new(),
            typing: TypingCoordinator::new(typing_ttl),
            scope: Arc::new(BroadcastToAll),
            users,
            chats,
            store_timeout,
        }
    }

    /// Swap the presence fan-out strategy. Must happen before connections
    /// arrive; the scope is consulted on every presence edge.
    pub fn with_scope(mut self, scope: Arc<dyn PresenceScope>) -> Self {
        self.scope = scope;
        self
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn rooms(&self) -> &RoomMembershipTable {
        &self.rooms
    }

    pub fn typing(&self) -> &TypingCoordinator {
        &self.typing
    }

    /// Bring a connection online. The first connection of a user flips
    /// them online, persists the edge, and fans the update out.
    pub async fn connect(
        &self,
        user_id: i64,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> RealtimeResult<ConnectionHandle> {
        let exists = read_with_retry(self.store_timeout, || self.users.find_by_id(user_id))
            .await?
            .is_some();
        if !exists {
            return Err(RealtimeError::UserNotFound(user_id));
        }

        let handle = ConnectionHandle::new(user_id, sender);
        if let Some(transition) = self.presence.register(handle.clone()).await {
            self.apply_presence_edge(&transition).await;
        }
        handle.push(ServerEvent::Connected);
        info!(user_id, connection_id = %handle.id, "connection established");
        Ok(handle)
    }

    /// Tear a connection down. Runs synchronously in this order: room
    /// subscriptions go first, then typing indicators, then the presence
    /// edge, so no event can be routed to a half-dismantled session.
    pub async fn disconnect(&self, user_id: i64, connection_id: ConnectionId) {
        self.rooms.drop_connection(connection_id).await;

        // Other connections of the same user keep their own typing state
        // alive through the TTL; clearing per user matches how indicators
        // were started.
        if !self.presence.is_online_elsewhere(user_id, connection_id).await {
            for chat_id in self.typing.clear_user(user_id).await {
                self.broadcast_typing(chat_id, user_id, false).await;
            }
        }

        if let Some(transition) = self.presence.unregister(user_id, connection_id).await {
            self.apply_presence_edge(&transition).await;
        }
        info!(user_id, %connection_id, "connection closed");
    }

    /// Subscribe a connection to a chat room. Membership is checked
    /// against the store; non-members cannot observe a room.
    pub async fn join_chat(
        &self,
        handle: &ConnectionHandle,
        chat_public_id: &str,
    ) -> RealtimeResult<()> {
        let chat = self.require_membership(handle.user_id, chat_public_id).await?;
        self.rooms.join(chat.id, handle.clone()).await;
        Ok(())
    }

    pub async fn leave_chat(
        &self,
        handle: &ConnectionHandle,
        chat_public_id: &str,
    ) -> RealtimeResult<()> {
        let chat = self
            .find_chat(chat_public_id)
            .await?
            .ok_or_else(|| RealtimeError::chat_not_found(chat_public_id))?;
        self.rooms.leave(chat.id, handle.id).await;
        Ok(())
    }

    /// Mark a member as typing. Only the first activation inside the TTL
    /// window is broadcast.
    pub async fn start_typing(&self, user_id: i64, chat_public_id: &str) -> RealtimeResult<()> {
        let chat = self.require_membership(user_id, chat_public_id).await?;
        if self.typing.start(chat.id, user_id).await {
            self.broadcast_typing(chat.id, user_id, true).await;
        }
        Ok(())
    }

    pub async fn stop_typing(&self, user_id: i64, chat_public_id: &str) -> RealtimeResult<()> {
        let chat = self.require_membership(user_id, chat_public_id).await?;
        if self.typing.stop(chat.id, user_id).await {
            self.broadcast_typing(chat.id, user_id, false).await;
        }
        Ok(())
    }

    async fn broadcast_typing(&self, chat_id: i64, user_id: i64, started: bool) {
        let summary = match read_with_retry(self.store_timeout, || self.users.summary(user_id))
            .await
        {
            Ok(Some(summary)) => summary,
            Ok(None) => return,
            Err(error) => {
                warn!(user_id, %error, "failed to load typist summary");
                return;
            }
        };

        let chat_public_id = match self.chat_public_id(chat_id).await {
            Some(id) => id,
            None => return,
        };

        let payload = TypingPayload {
            chat_id: chat_public_id,
            user: summary,
        };
        let event = if started {
            ServerEvent::Typing(payload)
        } else {
            ServerEvent::StopTyping(payload)
        };
        for handle in self.rooms.subscribers(chat_id).await {
            if handle.user_id != user_id {
                handle.push(event.clone());
            }
        }
    }

    /// Persist a presence edge and fan it out through the scope. A store
    /// failure is logged and the broadcast still happens; in-memory state
    /// is the source of truth for liveness.
    async fn apply_presence_edge(&self, transition: &PresenceTransition) {
        let persisted = with_timeout(
            self.store_timeout,
            self.users.update_presence(
                transition.user_id,
                transition.status,
                &transition.last_seen,
            ),
        )
        .await;
        if let Err(error) = persisted {
            warn!(user_id = transition.user_id, %error, "failed to persist presence edge");
        }

        let event = transition.to_event();
        let recipients = self
            .scope
            .recipients(transition.user_id, self.presence.all_connections().await);
        for handle in recipients {
            handle.push(event.clone());
        }
    }

    async fn chat_public_id(&self, chat_id: i64) -> Option<String> {
        // Room state stores rowids; events carry public ids.
        match read_with_retry(self.store_timeout, || self.chats.find_by_rowid(chat_id)).await {
            Ok(Some(chat)) => Some(chat.public_id),
            Ok(None) => None,
            Err(error) => {
                warn!(chat_id, %error, "failed to resolve chat public id");
                None
            }
        }
    }

    async fn require_membership(
        &self,
        user_id: i64,
        chat_public_id: &str,
    ) -> RealtimeResult<Chat> {
        let chat = self
            .find_chat(chat_public_id)
            .await?
            .ok_or_else(|| RealtimeError::chat_not_found(chat_public_id))?;
        let is_member =
            read_with_retry(self.store_timeout, || self.chats.is_member(chat.id, user_id)).await?;
        if !is_member {
            return Err(RealtimeError::authorization("not a member of this chat"));
        }
        Ok(chat)
    }

    async fn find_chat(&self, chat_public_id: &str) -> RealtimeResult<Option<Chat>> {
        Ok(read_with_retry(self.store_timeout, || {
            self.chats.find_by_public_id(chat_public_id)
        })
        .await?)
    }
}

//! Message delivery engine: the persist-then-fan-out path.
//!
//! A delivery runs under its chat's lock from the moment the message is
//! persisted until every recipient copy is enqueued. Socket writes happen
//! after the lock is released, on each connection's writer task, so the
//! lock bounds ordering but never socket I/O.

use crate::errors::{RealtimeError, RealtimeResult};
use crate::events::{DeliveryTarget, SeenPayload, ServerEvent, TypingPayload};
use crate::locks::ChatLocks;
use crate::presence::PresenceRegistry;
use crate::rooms::RoomMembershipTable;
use crate::store_ops::{read_with_retry, with_timeout};
use crate::typing::TypingCoordinator;
use parley_database::entities::{Chat, CreateMessageRequest, Message, MessageType};
use parley_database::repos::{ChatRepository, MessageRepository, NotificationRepository};
use std::{collections::HashSet, time::Duration};
use tracing::{info, warn};

#[derive(Clone)]
pub struct MessageDeliveryEngine {
    chats: ChatRepository,
    messages: MessageRepository,
    notifications: NotificationRepository,
    rooms: RoomMembershipTable,
    presence: PresenceRegistry,
    typing: TypingCoordinator,
    locks: ChatLocks,
    store_timeout: Duration,
}

/// What a client asks to send. Validation happens in the engine so every
/// transport shares it.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub chat_public_id: String,
    pub content: Option<String>,
    pub message_type: MessageType,
    pub media_url: Option<String>,
}

impl MessageDeliveryEngine {
    pub fn new(
        chats: ChatRepository,
        messages: MessageRepository,
        notifications: NotificationRepository,
        rooms: RoomMembershipTable,
        presence: PresenceRegistry,
        typing: TypingCoordinator,
        locks: ChatLocks,
        store_timeout: Duration,
    ) -> Self {
        Self {
            chats,
            messages,
            notifications,
            rooms,
            presence,
            typing,
            locks,
            store_timeout,
        }
    }

    /// Persist a message and fan it out. Subscribed members get the message
    /// event on their room connections; members without a subscription get
    /// a durable notification row plus, when online, a notification push.
    pub async fn send(&self, sender_id: i64, outgoing: OutgoingMessage) -> RealtimeResult<Message> {
        validate_outgoing(&outgoing)?;

        let chat = self.resolve_chat(&outgoing.chat_public_id).await?;
        let _guard = self.locks.acquire(chat.id).await;

        // Membership is read under the lock so a concurrent removal cannot
        // slip between the check and the persist.
        let member_ids =
            read_with_retry(self.store_timeout, || self.chats.member_user_ids(chat.id)).await?;
        if !member_ids.contains(&sender_id) {
            return Err(RealtimeError::authorization(
                "sender is not a member of this chat",
            ));
        }

        let message = with_timeout(
            self.store_timeout,
            self.messages.create(CreateMessageRequest {
                chat_id: chat.id,
                sender_id,
                content: outgoing.content,
                message_type: outgoing.message_type,
                media_url: outgoing.media_url,
            }),
        )
        .await?;

        // Sending a message is an implicit stop-typing for the sender.
        if self.typing.stop(chat.id, sender_id).await {
            let payload = TypingPayload {
                chat_id: chat.public_id.clone(),
                user: message.sender.clone(),
            };
            for handle in self.rooms.subscribers(chat.id).await {
                if handle.user_id != sender_id {
                    handle.push(ServerEvent::StopTyping(payload.clone()));
                }
            }
        }

        let subscribed = self.rooms.subscribed_user_ids(chat.id).await;
        let targets = delivery_targets(chat.id, &member_ids, &subscribed, sender_id);

        for target in targets {
            match target {
                DeliveryTarget::RoomBroadcast { chat_id } => {
                    for handle in self.rooms.subscribers(chat_id).await {
                        if handle.user_id != sender_id {
                            handle.push(ServerEvent::MessageReceived(message.clone()));
                        }
                    }
                }
                DeliveryTarget::DirectNotification { user_id } => {
                    let notification = match with_timeout(
                        self.store_timeout,
                        self.notifications.create_new_message(
                            user_id,
                            &chat.public_id,
                            &message.public_id,
                            sender_id,
                        ),
                    )
                    .await
                    {
                        Ok(notification) => notification,
                        Err(error) => {
                            // Message delivery already succeeded; a failed
                            // notification row must not fail the send.
                            warn!(user_id, %error, "failed to persist notification");
                            continue;
                        }
                    };
                    for handle in self.presence.connections_for(user_id).await {
                        handle.push(ServerEvent::NewMessageNotification(notification.clone()));
                    }
                }
            }
        }

        info!(
            chat_id = chat.id,
            message_id = message.id,
            sender_id,
            "delivered message"
        );
        Ok(message)
    }

    /// Record a seen receipt and fan the seen-set growth out to the room.
    /// A repeat receipt is accepted silently without a broadcast, and a
    /// receipt for a message that no longer exists is logged and dropped.
    pub async fn mark_seen(&self, user_id: i64, message_public_id: &str) -> RealtimeResult<()> {
        let Some(message) = read_with_retry(self.store_timeout, || {
            self.messages.find_by_public_id(message_public_id)
        })
        .await?
        else {
            warn!(message_public_id, user_id, "seen receipt for missing message");
            return Ok(());
        };

        let is_member = read_with_retry(self.store_timeout, || {
            self.chats.is_member(message.chat_id, user_id)
        })
        .await?;
        if !is_member {
            return Err(RealtimeError::authorization(
                "only chat members can mark messages seen",
            ));
        }

        let _guard = self.locks.acquire(message.chat_id).await;

        let newly_seen =
            with_timeout(self.store_timeout, self.messages.mark_seen(message.id, user_id)).await?;
        if !newly_seen {
            return Ok(());
        }

        let payload = SeenPayload {
            chat_id: message.chat_public_id.clone(),
            message_id: message.public_id.clone(),
            user_id,
        };
        for handle in self.rooms.subscribers(message.chat_id).await {
            handle.push(ServerEvent::MessageSeen(payload.clone()));
        }
        Ok(())
    }

    async fn resolve_chat(&self, chat_public_id: &str) -> RealtimeResult<Chat> {
        read_with_retry(self.store_timeout, || {
            self.chats.find_by_public_id(chat_public_id)
        })
        .await?
        .ok_or_else(|| RealtimeError::chat_not_found(chat_public_id))
    }
}

/// Routing decision for one message: subscribed members share a single room
/// broadcast; every other member gets a direct notification. The sender
/// never receives their own copy.
pub fn delivery_targets(
    chat_id: i64,
    member_ids: &[i64],
    subscribed: &HashSet<i64>,
    sender_id: i64,
) -> Vec<DeliveryTarget> {
    let mut targets = Vec::new();
    let any_subscribed_recipient = member_ids
        .iter()
        .any(|id| *id != sender_id && subscribed.contains(id));
    if any_subscribed_recipient {
        targets.push(DeliveryTarget::RoomBroadcast { chat_id });
    }
    for member in member_ids {
        if *member != sender_id && !subscribed.contains(member) {
            targets.push(DeliveryTarget::DirectNotification { user_id: *member });
        }
    }
    targets
}

fn validate_outgoing(outgoing: &OutgoingMessage) -> RealtimeResult<()> {
    if outgoing.message_type.requires_media() {
        if outgoing.media_url.as_deref().unwrap_or("").is_empty() {
            return Err(RealtimeError::validation(format!(
                "{} message needs a media url",
                outgoing.message_type
            )));
        }
    } else {
        let empty = outgoing
            .content
            .as_deref()
            .map(|c| c.trim().is_empty())
            .unwrap_or(true);
        if empty {
            return Err(RealtimeError::validation("text message needs content"));
        }
    }
    Ok(())
}

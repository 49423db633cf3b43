//! Chat lifecycle manager: creation, membership mutation, and teardown.
//!
//! The manager decides what a mutation means (who becomes admin, whether
//! the chat survives) and hands the repository one atomic application of
//! that decision. Each membership mutation runs under the chat's lock,
//! shared with the delivery engine, so the decision is applied to the
//! same membership it was derived from. Runtime room state is reconciled
//! after the store commit.

use crate::errors::{RealtimeError, RealtimeResult};
use crate::locks::ChatLocks;
use crate::rooms::RoomMembershipTable;
use crate::store_ops::{read_with_retry, with_timeout};
use parley_database::entities::{direct_key, Chat};
use parley_database::repos::{ChatRepository, UserRepository};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct ChatLifecycleManager {
    chats: ChatRepository,
    users: UserRepository,
    rooms: RoomMembershipTable,
    locks: ChatLocks,
    store_timeout: Duration,
}

/// Outcome of a leave or removal, for callers that need to know whether
/// the chat survived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipOutcome {
    /// The chat still exists; `new_admin` is set when the role moved.
    Updated { new_admin: Option<i64> },
    /// The departing member was the last one; the chat is gone.
    ChatDeleted,
}

impl ChatLifecycleManager {
    pub fn new(
        chats: ChatRepository,
        users: UserRepository,
        rooms: RoomMembershipTable,
        locks: ChatLocks,
        store_timeout: Duration,
    ) -> Self {
        Self {
            chats,
            users,
            rooms,
            locks,
            store_timeout,
        }
    }

    /// Return the direct chat between two users, creating it on first
    /// access. Two concurrent first accesses race on the canonical pair
    /// key's uniqueness; the loser re-reads and returns the winner's chat.
    pub async fn access_or_create(&self, user_id: i64, other_user_id: i64) -> RealtimeResult<Chat> {
        if user_id == other_user_id {
            return Err(RealtimeError::validation(
                "cannot open a direct chat with yourself",
            ));
        }
        self.require_user(other_user_id).await?;

        let key = direct_key(user_id, other_user_id);
        if let Some(existing) = read_with_retry(self.store_timeout, || {
            self.chats.find_by_direct_key(&key)
        })
        .await?
        {
            return Ok(existing);
        }

        match with_timeout(
            self.store_timeout,
            self.chats.create_direct(user_id, other_user_id, &key),
        )
        .await
        {
            Ok(chat) => Ok(chat),
            Err(error) if error.is_unique_violation() => {
                // Lost the creation race; the winner's row is the chat.
                let winner = read_with_retry(self.store_timeout, || {
                    self.chats.find_by_direct_key(&key)
                })
                .await?;
                winner.ok_or_else(|| RealtimeError::chat_not_found(key.clone()))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Create a group chat with the creator as admin. The creator counts as
    /// a member whether or not the caller listed them.
    pub async fn create_group(
        &self,
        admin_id: i64,
        name: &str,
        member_ids: &[i64],
    ) -> RealtimeResult<Chat> {
        if name.trim().is_empty() {
            return Err(RealtimeError::validation("group chat needs a name"));
        }

        let mut members: Vec<i64> = vec![admin_id];
        for id in member_ids {
            if !members.contains(id) {
                members.push(*id);
            }
        }
        if members.len() < 3 {
            return Err(RealtimeError::validation(
                "group chat needs at least two other members",
            ));
        }
        for id in &members {
            self.require_user(*id).await?;
        }

        let chat = with_timeout(
            self.store_timeout,
            self.chats.create_group(name.trim(), &members, admin_id),
        )
        .await?;
        Ok(chat)
    }

    /// Rename a group. Any current member may rename.
    pub async fn rename(
        &self,
        user_id: i64,
        chat_public_id: &str,
        name: &str,
    ) -> RealtimeResult<Chat> {
        if name.trim().is_empty() {
            return Err(RealtimeError::validation("chat name cannot be empty"));
        }
        let chat = self.require_group(chat_public_id).await?;
        self.require_member(&chat, user_id).await?;

        with_timeout(self.store_timeout, self.chats.rename(chat.id, name.trim())).await?;
        self.reload(chat_public_id).await
    }

    /// Add a member to a group. Admin only; adding an existing member is a
    /// no-op success.
    pub async fn add_member(
        &self,
        actor_id: i64,
        chat_public_id: &str,
        user_id: i64,
    ) -> RealtimeResult<Chat> {
        let chat = self.require_group(chat_public_id).await?;
        let _guard = self.locks.acquire(chat.id).await;
        // Re-read under the lock; the admin role may have moved.
        let chat = self.require_group(chat_public_id).await?;
        if !chat.is_admin(actor_id) {
            return Err(RealtimeError::authorization("only the admin can add members"));
        }
        self.require_user(user_id).await?;

        with_timeout(self.store_timeout, self.chats.add_member(chat.id, user_id)).await?;
        info!(chat_id = chat.id, user_id, "member added to group");
        self.reload(chat_public_id).await
    }

    /// Remove a member from a group. The admin may remove anyone; a
    /// non-admin may only remove themself. Removing the admin while other
    /// members remain is rejected; the role transfers through
    /// [`Self::leave`] instead. The removed user's connections are evicted
    /// from the room once the store commit succeeds.
    pub async fn remove_member(
        &self,
        actor_id: i64,
        chat_public_id: &str,
        user_id: i64,
    ) -> RealtimeResult<Option<Chat>> {
        let chat = self.require_group(chat_public_id).await?;
        let _guard = self.locks.acquire(chat.id).await;
        // Re-read under the lock; a concurrent mutation may have moved the
        // admin role or changed the membership this decision depends on.
        let chat = self.require_group(chat_public_id).await?;
        if actor_id != user_id && !chat.is_admin(actor_id) {
            return Err(RealtimeError::authorization(
                "only the admin can remove other members",
            ));
        }

        let members = read_with_retry(self.store_timeout, || self.chats.members(chat.id)).await?;
        if !members.iter().any(|m| m.user_id == user_id) {
            return Err(RealtimeError::validation("target is not a member"));
        }

        let last_member = members.len() == 1;
        if chat.is_admin(user_id) && !last_member {
            return Err(RealtimeError::validation(
                "transfer the admin role before removing the admin",
            ));
        }

        with_timeout(
            self.store_timeout,
            self.chats.apply_remove(chat.id, user_id, last_member),
        )
        .await?;
        if last_member {
            self.rooms.drop_room(chat.id).await;
            info!(chat_id = chat.id, "group deleted after last member removal");
            return Ok(None);
        }
        self.rooms.force_unsubscribe(chat.id, user_id).await;
        info!(chat_id = chat.id, user_id, "member removed from group");
        Ok(Some(self.reload(chat_public_id).await?))
    }

    /// Leave a chat. When the admin leaves, the role passes to the first
    /// remaining member in stored member order; when the last member
    /// leaves, the chat is deleted and its room dropped.
    pub async fn leave(
        &self,
        user_id: i64,
        chat_public_id: &str,
    ) -> RealtimeResult<MembershipOutcome> {
        let chat = self
            .find_chat(chat_public_id)
            .await?
            .ok_or_else(|| RealtimeError::chat_not_found(chat_public_id))?;
        let _guard = self.locks.acquire(chat.id).await;
        // Re-read under the lock: a concurrent leave may already have
        // deleted the chat or moved the admin role.
        let chat = self.reload(chat_public_id).await?;

        let members = read_with_retry(self.store_timeout, || self.chats.members(chat.id)).await?;
        if !members.iter().any(|m| m.user_id == user_id) {
            return Err(RealtimeError::authorization("not a member of this chat"));
        }

        let remaining: Vec<i64> = members
            .iter()
            .map(|m| m.user_id)
            .filter(|id| *id != user_id)
            .collect();

        if remaining.is_empty() {
            with_timeout(
                self.store_timeout,
                self.chats.apply_leave(chat.id, user_id, None, true),
            )
            .await?;
            self.rooms.drop_room(chat.id).await;
            info!(chat_id = chat.id, user_id, "last member left, chat deleted");
            return Ok(MembershipOutcome::ChatDeleted);
        }

        let new_admin = if chat.is_admin(user_id) {
            Some(remaining[0])
        } else {
            None
        };

        with_timeout(
            self.store_timeout,
            self.chats.apply_leave(chat.id, user_id, new_admin, false),
        )
        .await?;
        self.rooms.force_unsubscribe(chat.id, user_id).await;
        info!(chat_id = chat.id, user_id, ?new_admin, "member left chat");
        Ok(MembershipOutcome::Updated { new_admin })
    }

    /// Chats the user belongs to, most recently active first.
    pub async fn list_for_user(&self, user_id: i64) -> RealtimeResult<Vec<Chat>> {
        Ok(read_with_retry(self.store_timeout, || self.chats.list_for_user(user_id)).await?)
    }

    /// Fetch a chat the user is a member of.
    pub async fn chat_for_member(
        &self,
        user_id: i64,
        chat_public_id: &str,
    ) -> RealtimeResult<Chat> {
        let chat = self
            .find_chat(chat_public_id)
            .await?
            .ok_or_else(|| RealtimeError::chat_not_found(chat_public_id))?;
        self.require_member(&chat, user_id).await?;
        Ok(chat)
    }

    async fn find_chat(&self, chat_public_id: &str) -> RealtimeResult<Option<Chat>> {
        Ok(read_with_retry(self.store_timeout, || {
            self.chats.find_by_public_id(chat_public_id)
        })
        .await?)
    }

    async fn reload(&self, chat_public_id: &str) -> RealtimeResult<Chat> {
        self.find_chat(chat_public_id)
            .await?
            .ok_or_else(|| RealtimeError::chat_not_found(chat_public_id))
    }

    async fn require_group(&self, chat_public_id: &str) -> RealtimeResult<Chat> {
        let chat = self
            .find_chat(chat_public_id)
            .await?
            .ok_or_else(|| RealtimeError::chat_not_found(chat_public_id))?;
        if !chat.is_group {
            return Err(RealtimeError::validation(
                "operation applies to group chats only",
            ));
        }
        Ok(chat)
    }

    async fn require_member(&self, chat: &Chat, user_id: i64) -> RealtimeResult<()> {
        let is_member =
            read_with_retry(self.store_timeout, || self.chats.is_member(chat.id, user_id)).await?;
        if !is_member {
            return Err(RealtimeError::authorization("not a member of this chat"));
        }
        Ok(())
    }

    async fn require_user(&self, user_id: i64) -> RealtimeResult<()> {
        let exists = read_with_retry(self.store_timeout, || self.users.find_by_id(user_id))
            .await?
            .is_some();
        if !exists {
            return Err(RealtimeError::UserNotFound(user_id));
        }
        Ok(())
    }
}

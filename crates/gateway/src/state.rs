//! Shared gateway state wiring the session core to the transport layer.

use parley_config::RealtimeConfig;
use parley_database::repos::{
    ChatRepository, MessageRepository, NotificationRepository, UserRepository,
};
use parley_database::SqlitePool;
use parley_realtime::{
    ChatLifecycleManager, ChatLocks, MessageDeliveryEngine, RealtimeContext,
};
use std::time::Duration;

#[derive(Clone)]
pub struct GatewayState {
    pub users: UserRepository,
    pub chats: ChatRepository,
    pub messages: MessageRepository,
    pub notifications: NotificationRepository,
    pub realtime: RealtimeContext,
    pub delivery: MessageDeliveryEngine,
    pub lifecycle: ChatLifecycleManager,
}

impl GatewayState {
    pub fn new(pool: SqlitePool, realtime: &RealtimeConfig) -> Self {
        let users = UserRepository::new(pool.clone());
        let chats = ChatRepository::new(pool.clone());
        let messages = MessageRepository::new(pool.clone());
        let notifications = NotificationRepository::new(pool.clone());

        let typing_ttl = Duration::from_secs(realtime.typing_ttl_seconds);
        let store_timeout = Duration::from_secs(realtime.store_timeout_seconds);

        let context = RealtimeContext::new(users.clone(), chats.clone(), typing_ttl, store_timeout);
        // Delivery and lifecycle share the per-chat locks so membership
        // mutations serialize with message persistence.
        let locks = ChatLocks::new();
        let delivery = MessageDeliveryEngine::new(
            chats.clone(),
            messages.clone(),
            notifications.clone(),
            context.rooms().clone(),
            context.presence().clone(),
            context.typing().clone(),
            locks.clone(),
            store_timeout,
        );
        let lifecycle = ChatLifecycleManager::new(
            chats.clone(),
            users.clone(),
            context.rooms().clone(),
            locks,
            store_timeout,
        );

        Self {
            users,
            chats,
            messages,
            notifications,
            realtime: context,
            delivery,
            lifecycle,
        }
    }
}

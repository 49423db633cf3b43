//! End-to-end tests for the session and delivery core against a real
//! throwaway database, with channel receivers standing in for sockets.

use parley_config::DatabaseConfig;
use parley_database::entities::{CreateUserRequest, MessageType, PresenceStatus};
use parley_database::repos::{
    ChatRepository, MessageRepository, NotificationRepository, UserRepository,
};
use parley_database::{initialize_database, SqlitePool};
use parley_realtime::{
    ChatLifecycleManager, ChatLocks, ConnectionHandle, MembershipOutcome, MessageDeliveryEngine,
    OutgoingMessage, RealtimeContext, RealtimeError, ServerEvent,
};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const STORE_TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    _dir: TempDir,
    pool: SqlitePool,
    context: RealtimeContext,
    delivery: MessageDeliveryEngine,
    lifecycle: ChatLifecycleManager,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("test.db").display()),
            max_connections: 5,
        };
        let pool = initialize_database(&config).await.unwrap();

        let users = UserRepository::new(pool.clone());
        let chats = ChatRepository::new(pool.clone());
        let context = RealtimeContext::new(
            users.clone(),
            chats.clone(),
            Duration::from_secs(3),
            STORE_TIMEOUT,
        );
        let locks = ChatLocks::new();
        let delivery = MessageDeliveryEngine::new(
            chats.clone(),
            MessageRepository::new(pool.clone()),
            NotificationRepository::new(pool.clone()),
            context.rooms().clone(),
            context.presence().clone(),
            context.typing().clone(),
            locks.clone(),
            STORE_TIMEOUT,
        );
        let lifecycle = ChatLifecycleManager::new(
            chats,
            users,
            context.rooms().clone(),
            locks,
            STORE_TIMEOUT,
        );

        Self {
            _dir: dir,
            pool,
            context,
            delivery,
            lifecycle,
        }
    }

    async fn seed_user(&self, subject: &str, username: &str) -> i64 {
        UserRepository::new(self.pool.clone())
            .create(&CreateUserRequest {
                subject: subject.to_string(),
                username: username.to_string(),
                avatar_url: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn connect(
        &self,
        user_id: i64,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.context.connect(user_id, tx).await.unwrap();
        (handle, rx)
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn text(chat_public_id: &str, content: &str) -> OutgoingMessage {
    OutgoingMessage {
        chat_public_id: chat_public_id.to_string(),
        content: Some(content.to_string()),
        message_type: MessageType::Text,
        media_url: None,
    }
}

#[tokio::test]
async fn presence_broadcasts_only_on_edges_and_persists() {
    let h = Harness::new().await;
    let alice = h.seed_user("auth0|alice", "alice").await;
    let bob = h.seed_user("auth0|bob", "bob").await;

    let (_alice_conn, mut alice_rx) = h.connect(alice).await;
    drain(&mut alice_rx);

    // Bob's first connection is an edge; his second is not.
    let (bob_first, _bob_rx1) = h.connect(bob).await;
    let events = drain(&mut alice_rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::PresenceUpdate(p) if p.user_id == bob && p.status == PresenceStatus::Online
    )));

    let (bob_second, _bob_rx2) = h.connect(bob).await;
    assert!(drain(&mut alice_rx).is_empty());

    let users = UserRepository::new(h.pool.clone());
    let stored = users.find_by_id(bob).await.unwrap().unwrap();
    assert_eq!(stored.status, PresenceStatus::Online);

    // Dropping one of two connections is silent; dropping the last flips
    // bob offline.
    h.context.disconnect(bob, bob_first.id).await;
    assert!(drain(&mut alice_rx).is_empty());

    h.context.disconnect(bob, bob_second.id).await;
    let events = drain(&mut alice_rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::PresenceUpdate(p) if p.user_id == bob && p.status == PresenceStatus::Offline
    )));

    let stored = users.find_by_id(bob).await.unwrap().unwrap();
    assert_eq!(stored.status, PresenceStatus::Offline);
}

#[tokio::test]
async fn subscribed_members_get_messages_others_get_notifications() {
    let h = Harness::new().await;
    let alice = h.seed_user("auth0|alice", "alice").await;
    let bob = h.seed_user("auth0|bob", "bob").await;
    let carol = h.seed_user("auth0|carol", "carol").await;

    let chat = h
        .lifecycle
        .create_group(alice, "lunch", &[bob, carol])
        .await
        .unwrap();

    let (alice_conn, mut alice_rx) = h.connect(alice).await;
    let (bob_conn, mut bob_rx) = h.connect(bob).await;
    let (_carol_conn, mut carol_rx) = h.connect(carol).await;

    // Alice and bob are in the room; carol is online but not subscribed.
    h.context.join_chat(&alice_conn, &chat.public_id).await.unwrap();
    h.context.join_chat(&bob_conn, &chat.public_id).await.unwrap();
    drain(&mut alice_rx);
    drain(&mut bob_rx);
    drain(&mut carol_rx);

    let message = h
        .delivery
        .send(alice, text(&chat.public_id, "hello"))
        .await
        .unwrap();

    // The sender's own room connection gets nothing back.
    assert!(drain(&mut alice_rx).is_empty());

    let bob_events = drain(&mut bob_rx);
    assert!(bob_events.iter().any(|e| matches!(
        e,
        ServerEvent::MessageReceived(m) if m.public_id == message.public_id
    )));

    let carol_events = drain(&mut carol_rx);
    assert!(carol_events.iter().any(|e| matches!(
        e,
        ServerEvent::NewMessageNotification(n)
            if n.message_public_id == message.public_id && n.user_id == carol
    )));

    // The notification is durable too.
    let notifications = NotificationRepository::new(h.pool.clone());
    let unread = notifications.list_unread(carol).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].chat_public_id, chat.public_id);
}

#[tokio::test]
async fn non_member_cannot_send() {
    let h = Harness::new().await;
    let alice = h.seed_user("auth0|alice", "alice").await;
    let bob = h.seed_user("auth0|bob", "bob").await;
    let mallory = h.seed_user("auth0|mallory", "mallory").await;

    let chat = h.lifecycle.access_or_create(alice, bob).await.unwrap();
    let err = h
        .delivery
        .send(mallory, text(&chat.public_id, "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, RealtimeError::Authorization(_)));
}

#[tokio::test]
async fn messages_in_one_chat_arrive_in_send_order() {
    let h = Harness::new().await;
    let alice = h.seed_user("auth0|alice", "alice").await;
    let bob = h.seed_user("auth0|bob", "bob").await;

    let chat = h.lifecycle.access_or_create(alice, bob).await.unwrap();
    let (bob_conn, mut bob_rx) = h.connect(bob).await;
    h.context.join_chat(&bob_conn, &chat.public_id).await.unwrap();
    drain(&mut bob_rx);

    for content in ["one", "two", "three"] {
        h.delivery
            .send(alice, text(&chat.public_id, content))
            .await
            .unwrap();
    }

    let contents: Vec<String> = drain(&mut bob_rx)
        .into_iter()
        .filter_map(|e| match e {
            ServerEvent::MessageReceived(m) => m.content,
            _ => None,
        })
        .collect();
    assert_eq!(contents, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn seen_receipts_broadcast_once() {
    let h = Harness::new().await;
    let alice = h.seed_user("auth0|alice", "alice").await;
    let bob = h.seed_user("auth0|bob", "bob").await;

    let chat = h.lifecycle.access_or_create(alice, bob).await.unwrap();
    let (alice_conn, mut alice_rx) = h.connect(alice).await;
    h.context.join_chat(&alice_conn, &chat.public_id).await.unwrap();
    drain(&mut alice_rx);

    let message = h
        .delivery
        .send(alice, text(&chat.public_id, "hello"))
        .await
        .unwrap();
    drain(&mut alice_rx);

    h.delivery.mark_seen(bob, &message.public_id).await.unwrap();
    h.delivery.mark_seen(bob, &message.public_id).await.unwrap();

    let seen_events: Vec<_> = drain(&mut alice_rx)
        .into_iter()
        .filter(|e| matches!(e, ServerEvent::MessageSeen(_)))
        .collect();
    assert_eq!(seen_events.len(), 1);
}

#[tokio::test]
async fn direct_chat_access_is_deduplicated_under_races() {
    let h = Harness::new().await;
    let alice = h.seed_user("auth0|alice", "alice").await;
    let bob = h.seed_user("auth0|bob", "bob").await;

    let (first, second) = tokio::join!(
        h.lifecycle.access_or_create(alice, bob),
        h.lifecycle.access_or_create(bob, alice),
    );
    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.id, second.id);

    // A later access returns the same chat again.
    let third = h.lifecycle.access_or_create(alice, bob).await.unwrap();
    assert_eq!(third.id, first.id);
}

#[tokio::test]
async fn admin_leave_hands_role_to_first_remaining_member() {
    let h = Harness::new().await;
    let alice = h.seed_user("auth0|alice", "alice").await;
    let bob = h.seed_user("auth0|bob", "bob").await;
    let carol = h.seed_user("auth0|carol", "carol").await;

    let chat = h
        .lifecycle
        .create_group(alice, "lunch", &[bob, carol])
        .await
        .unwrap();

    let outcome = h.lifecycle.leave(alice, &chat.public_id).await.unwrap();
    assert_eq!(outcome, MembershipOutcome::Updated { new_admin: Some(bob) });

    let outcome = h.lifecycle.leave(bob, &chat.public_id).await.unwrap();
    assert_eq!(outcome, MembershipOutcome::Updated { new_admin: Some(carol) });

    let outcome = h.lifecycle.leave(carol, &chat.public_id).await.unwrap();
    assert_eq!(outcome, MembershipOutcome::ChatDeleted);
}

#[tokio::test]
async fn concurrent_leaves_keep_admin_with_a_remaining_member() {
    let h = Harness::new().await;
    let chats = ChatRepository::new(h.pool.clone());
    let alice = h.seed_user("auth0|alice", "alice").await;
    let bob = h.seed_user("auth0|bob", "bob").await;
    let carol = h.seed_user("auth0|carol", "carol").await;

    for round in 0..10 {
        let chat = h
            .lifecycle
            .create_group(alice, &format!("standup-{round}"), &[bob, carol])
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            h.lifecycle.leave(alice, &chat.public_id),
            h.lifecycle.leave(bob, &chat.public_id),
        );
        a.unwrap();
        b.unwrap();

        // Whichever order the leaves landed in, the role must end up with
        // the one member who is still there.
        let survivors = chats.members(chat.id).await.unwrap();
        assert_eq!(survivors.len(), 1, "round {round}");
        assert_eq!(survivors[0].user_id, carol, "round {round}");
        let reloaded = h.lifecycle.chat_for_member(carol, &chat.public_id).await.unwrap();
        assert!(reloaded.is_admin(carol), "round {round}");
    }
}

#[tokio::test]
async fn concurrent_last_two_leaves_delete_the_chat() {
    let h = Harness::new().await;
    let chats = ChatRepository::new(h.pool.clone());
    let alice = h.seed_user("auth0|alice", "alice").await;
    let bob = h.seed_user("auth0|bob", "bob").await;
    let carol = h.seed_user("auth0|carol", "carol").await;

    for round in 0..10 {
        let chat = h
            .lifecycle
            .create_group(alice, &format!("retro-{round}"), &[bob, carol])
            .await
            .unwrap();
        h.lifecycle.leave(carol, &chat.public_id).await.unwrap();

        let (a, b) = tokio::join!(
            h.lifecycle.leave(alice, &chat.public_id),
            h.lifecycle.leave(bob, &chat.public_id),
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == MembershipOutcome::ChatDeleted)
                .count(),
            1,
            "round {round}"
        );

        let gone = chats.find_by_public_id(&chat.public_id).await.unwrap();
        assert!(gone.is_none(), "round {round}");
    }
}

#[tokio::test]
async fn removed_member_stops_receiving_room_traffic() {
    let h = Harness::new().await;
    let alice = h.seed_user("auth0|alice", "alice").await;
    let bob = h.seed_user("auth0|bob", "bob").await;
    let carol = h.seed_user("auth0|carol", "carol").await;

    let chat = h
        .lifecycle
        .create_group(alice, "lunch", &[bob, carol])
        .await
        .unwrap();

    let (carol_conn, mut carol_rx) = h.connect(carol).await;
    h.context.join_chat(&carol_conn, &chat.public_id).await.unwrap();
    drain(&mut carol_rx);

    h.lifecycle
        .remove_member(alice, &chat.public_id, carol)
        .await
        .unwrap();

    h.delivery
        .send(alice, text(&chat.public_id, "after removal"))
        .await
        .unwrap();

    // No message event; carol is no longer a member so no notification
    // either.
    assert!(drain(&mut carol_rx)
        .iter()
        .all(|e| !matches!(e, ServerEvent::MessageReceived(_) | ServerEvent::NewMessageNotification(_))));
}

#[tokio::test]
async fn only_admin_mutates_group_membership() {
    let h = Harness::new().await;
    let alice = h.seed_user("auth0|alice", "alice").await;
    let bob = h.seed_user("auth0|bob", "bob").await;
    let carol = h.seed_user("auth0|carol", "carol").await;
    let dave = h.seed_user("auth0|dave", "dave").await;

    let chat = h
        .lifecycle
        .create_group(alice, "lunch", &[bob, carol])
        .await
        .unwrap();

    let err = h
        .lifecycle
        .add_member(bob, &chat.public_id, dave)
        .await
        .unwrap_err();
    assert!(matches!(err, RealtimeError::Authorization(_)));

    let err = h
        .lifecycle
        .remove_member(bob, &chat.public_id, carol)
        .await
        .unwrap_err();
    assert!(matches!(err, RealtimeError::Authorization(_)));

    // Removing the admin while others remain is rejected outright.
    let err = h
        .lifecycle
        .remove_member(alice, &chat.public_id, alice)
        .await
        .unwrap_err();
    assert!(matches!(err, RealtimeError::Validation(_)));

    // A non-admin may remove themself.
    let chat_after = h
        .lifecycle
        .remove_member(carol, &chat.public_id, carol)
        .await
        .unwrap();
    assert!(chat_after.is_some());
    let err = h
        .lifecycle
        .chat_for_member(carol, &chat.public_id)
        .await
        .unwrap_err();
    assert!(matches!(err, RealtimeError::Authorization(_)));

    // Any member may rename.
    let renamed = h
        .lifecycle
        .rename(bob, &chat.public_id, "brunch")
        .await
        .unwrap();
    assert_eq!(renamed.name.as_deref(), Some("brunch"));
}

#[tokio::test]
async fn typing_broadcasts_skip_the_typist_and_expire() {
    let h = Harness::new().await;
    let alice = h.seed_user("auth0|alice", "alice").await;
    let bob = h.seed_user("auth0|bob", "bob").await;

    let chat = h.lifecycle.access_or_create(alice, bob).await.unwrap();
    let (alice_conn, mut alice_rx) = h.connect(alice).await;
    let (bob_conn, mut bob_rx) = h.connect(bob).await;
    h.context.join_chat(&alice_conn, &chat.public_id).await.unwrap();
    h.context.join_chat(&bob_conn, &chat.public_id).await.unwrap();
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    h.context.start_typing(alice, &chat.public_id).await.unwrap();
    // Repeat while active refreshes silently.
    h.context.start_typing(alice, &chat.public_id).await.unwrap();

    assert!(drain(&mut alice_rx).is_empty());
    let bob_events = drain(&mut bob_rx);
    assert_eq!(
        bob_events
            .iter()
            .filter(|e| matches!(e, ServerEvent::Typing(_)))
            .count(),
        1
    );

    h.context.stop_typing(alice, &chat.public_id).await.unwrap();
    h.context.stop_typing(alice, &chat.public_id).await.unwrap();
    let bob_events = drain(&mut bob_rx);
    assert_eq!(
        bob_events
            .iter()
            .filter(|e| matches!(e, ServerEvent::StopTyping(_)))
            .count(),
        1
    );
}

#[tokio::test]
async fn disconnect_clears_rooms_and_typing() {
    let h = Harness::new().await;
    let alice = h.seed_user("auth0|alice", "alice").await;
    let bob = h.seed_user("auth0|bob", "bob").await;

    let chat = h.lifecycle.access_or_create(alice, bob).await.unwrap();
    let (alice_conn, _alice_rx) = h.connect(alice).await;
    let (bob_conn, mut bob_rx) = h.connect(bob).await;
    h.context.join_chat(&alice_conn, &chat.public_id).await.unwrap();
    h.context.join_chat(&bob_conn, &chat.public_id).await.unwrap();

    h.context.start_typing(alice, &chat.public_id).await.unwrap();
    drain(&mut bob_rx);

    h.context.disconnect(alice, alice_conn.id).await;

    // Bob sees the dangling indicator cleared, then the offline edge.
    let events = drain(&mut bob_rx);
    assert!(events.iter().any(|e| matches!(e, ServerEvent::StopTyping(_))));
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::PresenceUpdate(p)
            if p.user_id == alice && p.status == PresenceStatus::Offline
    )));
    assert!(h.context.rooms().subscribers(chat.id).await.iter().all(|c| c.user_id != alice));
}

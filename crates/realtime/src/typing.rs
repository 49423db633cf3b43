//! Typing coordinator: ephemeral per-room typing state with a TTL.
//!
//! Nothing here touches the store. Expired entries are pruned lazily on
//! access instead of by a background task, so an abandoned indicator can
//! outlive its deadline in memory but is never observable past it.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(3);

#[derive(Clone)]
pub struct TypingCoordinator {
    inner: Arc<Mutex<HashMap<(i64, i64), Instant>>>,
    ttl: Duration,
}

impl Default for TypingCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TTL)
    }
}

impl TypingCoordinator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Mark a user as typing in a chat. Returns `true` when the indicator
    /// newly became active and should be broadcast; a repeat while active
    /// only extends the deadline.
    pub async fn start(&self, chat_id: i64, user_id: i64) -> bool {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        Self::prune(&mut inner, now);
        inner
            .insert((chat_id, user_id), now + self.ttl)
            .is_none()
    }

    /// Clear a user's typing state in a chat. Returns `true` when an
    /// active indicator was cleared; stopping twice broadcasts once.
    pub async fn stop(&self, chat_id: i64, user_id: i64) -> bool {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        Self::prune(&mut inner, now);
        inner.remove(&(chat_id, user_id)).is_some()
    }

    /// Users currently typing in a chat.
    pub async fn active_typists(&self, chat_id: i64) -> Vec<i64> {
        let mut inner = self.inner.lock().await;
        Self::prune(&mut inner, Instant::now());
        inner
            .keys()
            .filter(|(c, _)| *c == chat_id)
            .map(|(_, user_id)| *user_id)
            .collect()
    }

    /// Clear every indicator a user holds, returning the chats that had
    /// one. Used on disconnect so the stop events can be fanned out.
    pub async fn clear_user(&self, user_id: i64) -> Vec<i64> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        Self::prune(&mut inner, now);
        let chats: Vec<i64> = inner
            .keys()
            .filter(|(_, u)| *u == user_id)
            .map(|(chat_id, _)| *chat_id)
            .collect();
        inner.retain(|(_, u), _| *u != user_id);
        chats
    }

    fn prune(inner: &mut HashMap<(i64, i64), Instant>, now: Instant) {
        inner.retain(|_, deadline| *deadline > now);
    }
}

//! Per-chat locks.
//!
//! Deliveries and membership mutations within one chat serialize on the
//! chat's lock: persisted order and fan-out enqueue order agree, and a
//! membership decision is applied to the membership it was derived from.
//! Different chats never contend.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct ChatLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one chat, creating it on first use.
    pub async fn acquire(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inner = self.inner.lock().await;
            Arc::clone(inner.entry(chat_id).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_chat_serializes_different_chats_do_not() {
        let locks = ChatLocks::new();

        let held = locks.acquire(1).await;

        // Another chat's lock is immediately available.
        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire(2)).await;
        assert!(other.is_ok());

        // The held chat's lock is not.
        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.acquire(1)).await;
        assert!(blocked.is_err());

        drop(held);
        let reacquired = tokio::time::timeout(Duration::from_millis(50), locks.acquire(1)).await;
        assert!(reacquired.is_ok());
    }
}

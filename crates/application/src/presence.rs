//! 在场跟踪器
//!
//! 记录哪些用户当前对哪些会话保持着活动连接。状态是进程内的、
//! 随连接生命周期存在的集合，不落库。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::ApplicationError;
use domain::{ChatId, SessionRepository, User, UserId, UserRepository};

#[async_trait::async_trait]
pub trait PresenceTracker: Send + Sync {
    /// 用户打开某个会话。同一会话重复进入（多标签页）是幂等的。
    async fn mark_entered(&self, user: UserId, chat: ChatId) -> Result<(), ApplicationError>;

    /// 用户关闭某个会话，恰好移除一个标记。
    async fn mark_exited(&self, user: UserId, chat: ChatId) -> Result<(), ApplicationError>;

    async fn is_present(&self, user: UserId, chat: ChatId) -> Result<bool, ApplicationError>;

    /// 该用户当前打开的所有会话。
    async fn open_chats(&self, user: UserId) -> Result<Vec<ChatId>, ApplicationError>;
}

/// 进程内实现：每个用户一个打开会话的集合，集合清空时整个条目移除，
/// 不留下空壳。增删是持锁的原子操作，并发标签页不会互相覆盖。
#[derive(Default)]
pub struct MemoryPresenceTracker {
    open: RwLock<HashMap<UserId, HashSet<ChatId>>>,
}

impl MemoryPresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PresenceTracker for MemoryPresenceTracker {
    async fn mark_entered(&self, user: UserId, chat: ChatId) -> Result<(), ApplicationError> {
        let mut open = self.open.write().await;
        open.entry(user).or_default().insert(chat);
        tracing::debug!(user_id = %user, chat_id = %chat, "用户进入会话");
        Ok(())
    }

    async fn mark_exited(&self, user: UserId, chat: ChatId) -> Result<(), ApplicationError> {
        let mut open = self.open.write().await;
        if let Some(chats) = open.get_mut(&user) {
            chats.remove(&chat);
            if chats.is_empty() {
                open.remove(&user);
            }
        }
        tracing::debug!(user_id = %user, chat_id = %chat, "用户离开会话");
        Ok(())
    }

    async fn is_present(&self, user: UserId, chat: ChatId) -> Result<bool, ApplicationError> {
        let open = self.open.read().await;
        Ok(open.get(&user).map(|c| c.contains(&chat)).unwrap_or(false))
    }

    async fn open_chats(&self, user: UserId) -> Result<Vec<ChatId>, ApplicationError> {
        let open = self.open.read().await;
        Ok(open
            .get(&user)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default())
    }
}

/// 在线状态推导：用户在线当且仅当其记录的会话键仍指向存活会话。
/// 失效的键在检查时被顺手清掉（惰性清理，没有后台扫描）。
#[derive(Clone)]
pub struct OnlineStatus {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
}

impl OnlineStatus {
    pub fn new(users: Arc<dyn UserRepository>, sessions: Arc<dyn SessionRepository>) -> Self {
        Self { users, sessions }
    }

    pub async fn is_online(&self, user: &User) -> Result<bool, ApplicationError> {
        let Some(key) = user.session_key.as_deref() else {
            return Ok(false);
        };
        if self.sessions.session_exists(key).await? {
            return Ok(true);
        }
        self.users.clear_session(user.id).await?;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enter_is_idempotent() {
        let tracker = MemoryPresenceTracker::new();
        let (user, chat) = (UserId::generate(), ChatId::generate());

        tracker.mark_entered(user, chat).await.unwrap();
        tracker.mark_entered(user, chat).await.unwrap();

        assert!(tracker.is_present(user, chat).await.unwrap());
        assert_eq!(tracker.open_chats(user).await.unwrap(), vec![chat]);

        // 一次退出就足够，不存在重复标记
        tracker.mark_exited(user, chat).await.unwrap();
        assert!(!tracker.is_present(user, chat).await.unwrap());
    }

    #[tokio::test]
    async fn exit_round_trips_for_any_position() {
        let tracker = MemoryPresenceTracker::new();
        let user = UserId::generate();
        let chats: Vec<ChatId> = (0..3).map(|_| ChatId::generate()).collect();
        for &chat in &chats {
            tracker.mark_entered(user, chat).await.unwrap();
        }

        // 首、中、尾三个位置各验证一次往返律
        for &target in &chats {
            let before: HashSet<ChatId> =
                tracker.open_chats(user).await.unwrap().into_iter().collect();
            tracker.mark_entered(user, target).await.unwrap();
            tracker.mark_exited(user, target).await.unwrap();
            // 幂等进入之后退出，恰好回到之前的集合去掉 target
            let mut expected = before.clone();
            expected.remove(&target);
            let after: HashSet<ChatId> =
                tracker.open_chats(user).await.unwrap().into_iter().collect();
            assert_eq!(after, expected);
            tracker.mark_entered(user, target).await.unwrap();
            let restored: HashSet<ChatId> =
                tracker.open_chats(user).await.unwrap().into_iter().collect();
            assert_eq!(restored, before);
        }
    }

    #[tokio::test]
    async fn empty_set_means_no_entry_left() {
        let tracker = MemoryPresenceTracker::new();
        let (user, chat) = (UserId::generate(), ChatId::generate());
        tracker.mark_entered(user, chat).await.unwrap();
        tracker.mark_exited(user, chat).await.unwrap();
        assert!(tracker.open_chats(user).await.unwrap().is_empty());
        assert!(tracker.open.read().await.get(&user).is_none());
    }

    #[tokio::test]
    async fn online_status_clears_stale_session() {
        use domain::User;

        let store = crate::memory::MemoryStore::new();
        let mut user = User::new(UserId::generate(), "ana", "ana@example.com");
        user.session_key = Some("stale-key".to_string());
        let user = store.seed_user(user).await;

        let online = OnlineStatus::new(store.clone(), store.clone());
        assert!(!online.is_online(&user).await.unwrap());

        // 惰性清理：失效键已被移除
        let reloaded = store.user(user.id).await.unwrap();
        assert_eq!(reloaded.session_key, None);

        // 存活会话则在线
        let mut user2 = User::new(UserId::generate(), "bia", "bia@example.com");
        user2.session_key = Some("live-key".to_string());
        let user2 = store.seed_user(user2).await;
        store.open_session("live-key", user2.id).await;
        assert!(online.is_online(&user2).await.unwrap());
    }
}

//! 内存存储
//!
//! 五个仓储接口的同进程实现，供测试和无数据库的本地运行使用。
//! 单把读写锁覆盖全部表，写操作整体原子，语义与持久化实现保持
//! 一致（无序对唯一、级联删除、幂等已读）。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use domain::{
    Chat, ChatId, ChatRepository, Message, MessageId, MessageRepository, Notification,
    NotificationId, NotificationKindTag, NotificationRepository, RepositoryError,
    SessionRepository, StoredChatMessage, Timestamp, User, UserId, UserRepository,
};

#[derive(Debug, Clone)]
struct ChatMessageRecord {
    chat_id: ChatId,
    message_id: MessageId,
    visualized: bool,
}

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    /// 规范化有序对，关系对称。
    friendships: HashSet<(UserId, UserId)>,
    chats: HashMap<ChatId, Chat>,
    messages: HashMap<MessageId, Message>,
    /// 插入序即发送序。
    chat_messages: Vec<ChatMessageRecord>,
    notifications: HashMap<NotificationId, Notification>,
    notification_order: Vec<NotificationId>,
    sessions: HashMap<String, UserId>,
}

fn friendship_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a.0 <= b.0 {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 直接写入用户，绕过唯一性检查，测试搭桥用。
    pub async fn seed_user(&self, user: User) -> User {
        let mut tables = self.tables.write().await;
        tables.users.insert(user.id, user.clone());
        user
    }

    pub async fn user(&self, id: UserId) -> Option<User> {
        self.tables.read().await.users.get(&id).cloned()
    }

    /// 建立登录会话并把键挂到用户上。
    pub async fn open_session(&self, key: &str, user: UserId) {
        let mut tables = self.tables.write().await;
        tables.sessions.insert(key.to_string(), user);
        if let Some(u) = tables.users.get_mut(&user) {
            u.session_key = Some(key.to_string());
        }
    }

    pub async fn close_session(&self, key: &str) {
        self.tables.write().await.sessions.remove(key);
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        let duplicate = tables
            .users
            .values()
            .any(|u| u.email == user.email || u.slug == user.slug);
        if duplicate {
            return Err(RepositoryError::conflict("email 或 slug 已存在"));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: User) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user.id) {
            return Err(RepositoryError::NotFound);
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.slug == slug).cloned())
    }

    async fn are_friends(&self, a: UserId, b: UserId) -> Result<bool, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.friendships.contains(&friendship_key(a, b)))
    }

    async fn add_friendship(&self, a: UserId, b: UserId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.friendships.insert(friendship_key(a, b));
        Ok(())
    }

    async fn clear_session(&self, user: UserId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if let Some(u) = tables.users.get_mut(&user) {
            if let Some(key) = u.session_key.take() {
                tables.sessions.remove(&key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChatRepository for MemoryStore {
    async fn create(&self, chat: Chat) -> Result<Chat, RepositoryError> {
        let mut tables = self.tables.write().await;
        let exists = tables.chats.values().any(|c| {
            (c.user1 == chat.user1 && c.user2 == chat.user2)
                || (c.user1 == chat.user2 && c.user2 == chat.user1)
        });
        if exists {
            return Err(RepositoryError::conflict("两人之间的会话已存在"));
        }
        tables.chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn update(&self, chat: Chat) -> Result<Chat, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.chats.contains_key(&chat.id) {
            return Err(RepositoryError::NotFound);
        }
        tables.chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn find_by_id(&self, id: ChatId) -> Result<Option<Chat>, RepositoryError> {
        Ok(self.tables.read().await.chats.get(&id).cloned())
    }

    async fn delete(&self, id: ChatId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.chats.remove(&id);
        let orphaned: Vec<MessageId> = tables
            .chat_messages
            .iter()
            .filter(|r| r.chat_id == id)
            .map(|r| r.message_id)
            .collect();
        tables.chat_messages.retain(|r| r.chat_id != id);
        for message_id in orphaned {
            tables.messages.remove(&message_id);
        }
        Ok(())
    }

    async fn find_between(&self, a: UserId, b: UserId) -> Result<Option<Chat>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .chats
            .values()
            .find(|c| (c.user1 == a && c.user2 == b) || (c.user1 == b && c.user2 == a))
            .cloned())
    }

    async fn list_visible_for(&self, user: UserId) -> Result<Vec<Chat>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .chats
            .values()
            .filter(|c| c.is_visible_to(user))
            .cloned()
            .collect())
    }
}

impl Tables {
    /// 某会话的消息记录及实体，发送序。
    fn chat_rows(&self, chat_id: ChatId) -> Vec<(&ChatMessageRecord, &Message)> {
        self.chat_messages
            .iter()
            .filter(|r| r.chat_id == chat_id)
            .filter_map(|r| self.messages.get(&r.message_id).map(|m| (r, m)))
            .collect()
    }
}

fn after(since: Option<Timestamp>, date: Timestamp) -> bool {
    since.map_or(true, |s| date > s)
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn create_in_chat(
        &self,
        chat_id: ChatId,
        message: Message,
        visualized: bool,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.chats.contains_key(&chat_id) {
            return Err(RepositoryError::NotFound);
        }
        let message_id = message.id;
        tables.messages.insert(message_id, message);
        tables.chat_messages.push(ChatMessageRecord {
            chat_id,
            message_id,
            visualized,
        });
        Ok(())
    }

    async fn find_message(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self.tables.read().await.messages.get(&id).cloned())
    }

    async fn messages(
        &self,
        chat_id: ChatId,
        since: Option<Timestamp>,
    ) -> Result<Vec<StoredChatMessage>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<StoredChatMessage> = tables
            .chat_rows(chat_id)
            .into_iter()
            .filter(|(_, m)| after(since, m.date))
            .map(|(r, m)| StoredChatMessage {
                message: m.clone(),
                visualized: r.visualized,
            })
            .collect();
        rows.reverse();
        Ok(rows)
    }

    async fn amount_of_messages(
        &self,
        chat_id: ChatId,
        since: Option<Timestamp>,
    ) -> Result<u64, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .chat_rows(chat_id)
            .into_iter()
            .filter(|(_, m)| after(since, m.date))
            .count() as u64)
    }

    async fn amount_of_unviewed(
        &self,
        chat_id: ChatId,
        excluding_author: UserId,
        since: Option<Timestamp>,
    ) -> Result<u64, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .chat_rows(chat_id)
            .into_iter()
            .filter(|(r, m)| !r.visualized && m.author != excluding_author && after(since, m.date))
            .count() as u64)
    }

    async fn last_message(
        &self,
        chat_id: ChatId,
        since: Option<Timestamp>,
    ) -> Result<Option<Message>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .chat_rows(chat_id)
            .into_iter()
            .filter(|(_, m)| after(since, m.date))
            .next_back()
            .map(|(_, m)| m.clone()))
    }

    async fn first_unviewed_message_id(
        &self,
        chat_id: ChatId,
        excluding_author: UserId,
    ) -> Result<Option<MessageId>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .chat_rows(chat_id)
            .into_iter()
            .find(|(r, m)| !r.visualized && m.author != excluding_author)
            .map(|(_, m)| m.id))
    }

    async fn has_unviewed(&self, chat_id: ChatId) -> Result<bool, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .chat_messages
            .iter()
            .any(|r| r.chat_id == chat_id && !r.visualized))
    }

    async fn mark_visualized(
        &self,
        chat_id: ChatId,
        excluding_author: UserId,
    ) -> Result<u64, RepositoryError> {
        let mut tables = self.tables.write().await;
        let mut changed = 0u64;
        let authored_by_other: HashSet<MessageId> = tables
            .messages
            .values()
            .filter(|m| m.author != excluding_author)
            .map(|m| m.id)
            .collect();
        for record in tables.chat_messages.iter_mut() {
            if record.chat_id == chat_id
                && !record.visualized
                && authored_by_other.contains(&record.message_id)
            {
                record.visualized = true;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn create(&self, notification: Notification) -> Result<Notification, RepositoryError> {
        let mut tables = self.tables.write().await;
        tables
            .notifications
            .insert(notification.id, notification.clone());
        tables.notification_order.push(notification.id);
        Ok(notification)
    }

    async fn update(&self, notification: Notification) -> Result<Notification, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.notifications.contains_key(&notification.id) {
            return Err(RepositoryError::NotFound);
        }
        tables
            .notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn delete(&self, id: NotificationId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.notifications.remove(&id);
        tables.notification_order.retain(|&n| n != id);
        Ok(())
    }

    async fn find(
        &self,
        id: NotificationId,
        tag: NotificationKindTag,
    ) -> Result<Option<Notification>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .get(&id)
            .filter(|n| n.kind_tag() == tag)
            .cloned())
    }

    async fn list_sent(
        &self,
        author: UserId,
        tag: NotificationKindTag,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .notification_order
            .iter()
            .rev()
            .filter_map(|id| tables.notifications.get(id))
            .filter(|n| n.author == author && n.author_view && n.kind_tag() == tag)
            .cloned()
            .collect())
    }

    async fn list_received(
        &self,
        receiver: UserId,
        tag: NotificationKindTag,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .notification_order
            .iter()
            .rev()
            .filter_map(|id| tables.notifications.get(id))
            .filter(|n| n.receiver == receiver && n.receiver_view && n.kind_tag() == tag)
            .cloned()
            .collect())
    }

    async fn list_finished_authored(
        &self,
        author: UserId,
        tag: NotificationKindTag,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .notification_order
            .iter()
            .rev()
            .filter_map(|id| tables.notifications.get(id))
            .filter(|n| n.author == author && n.is_finished() && n.kind_tag() == tag)
            .cloned()
            .collect())
    }

    async fn list_finished_received(
        &self,
        receiver: UserId,
        tag: NotificationKindTag,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .notification_order
            .iter()
            .rev()
            .filter_map(|id| tables.notifications.get(id))
            .filter(|n| n.receiver == receiver && n.is_finished() && n.kind_tag() == tag)
            .cloned()
            .collect())
    }

    async fn pending_friendship_exists(
        &self,
        author: UserId,
        receiver: UserId,
    ) -> Result<bool, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.notifications.values().any(|n| {
            n.author == author
                && n.receiver == receiver
                && n.kind_tag() == NotificationKindTag::Friendship
                && !n.is_finished()
        }))
    }

    async fn has_pending_for(&self, receiver: UserId) -> Result<bool, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .values()
            .any(|n| n.receiver == receiver && n.receiver_view && !n.is_finished()))
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn session_exists(&self, key: &str) -> Result<bool, RepositoryError> {
        Ok(self.tables.read().await.sessions.contains_key(key))
    }

    async fn find_user(&self, key: &str) -> Result<Option<UserId>, RepositoryError> {
        Ok(self.tables.read().await.sessions.get(key).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{MessageBody, MessageId};

    fn user(name: &str) -> User {
        User::new(UserId::generate(), name, format!("{name}@test.dev"))
    }

    fn message(author: UserId, text: &str, date: Timestamp) -> Message {
        Message::new(
            MessageId::generate(),
            author,
            MessageBody::text(text).unwrap(),
            date,
        )
    }

    async fn chat_between(store: &MemoryStore) -> (Chat, User, User) {
        let (a, b) = (user("alice"), user("bob"));
        store.seed_user(a.clone()).await;
        store.seed_user(b.clone()).await;
        let chat = ChatRepository::create(store, Chat::new(ChatId::generate(), a.id, b.id).unwrap())
            .await
            .unwrap();
        (chat, a, b)
    }

    #[tokio::test]
    async fn duplicate_chat_pair_conflicts_either_order() {
        let store = MemoryStore::new();
        let (chat, a, b) = chat_between(&store).await;
        let reversed = Chat::new(ChatId::generate(), b.id, a.id).unwrap();
        assert!(matches!(
            ChatRepository::create(store.as_ref(), reversed).await,
            Err(RepositoryError::Conflict(_))
        ));
        assert!(store.find_between(b.id, a.id).await.unwrap().is_some());
        let _ = chat;
    }

    #[tokio::test]
    async fn deleting_chat_cascades_its_messages() {
        let store = MemoryStore::new();
        let (chat, a, _) = chat_between(&store).await;
        let msg = message(a.id, "oi", Utc::now());
        let message_id = msg.id;
        store.create_in_chat(chat.id, msg, false).await.unwrap();

        ChatRepository::delete(store.as_ref(), chat.id)
            .await
            .unwrap();
        assert!(store.find_message(message_id).await.unwrap().is_none());
        assert_eq!(store.amount_of_messages(chat.id, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mark_visualized_skips_own_messages_and_is_idempotent() {
        let store = MemoryStore::new();
        let (chat, a, b) = chat_between(&store).await;
        let now = Utc::now();
        store
            .create_in_chat(chat.id, message(a.id, "1", now), false)
            .await
            .unwrap();
        store
            .create_in_chat(chat.id, message(b.id, "2", now), false)
            .await
            .unwrap();

        // b 标记已读：只有 a 发的那条受影响
        assert_eq!(store.mark_visualized(chat.id, b.id).await.unwrap(), 1);
        assert_eq!(store.mark_visualized(chat.id, b.id).await.unwrap(), 0);
        assert_eq!(
            store.amount_of_unviewed(chat.id, b.id, None).await.unwrap(),
            0
        );
        // 导航栏视角不排除作者，b 自己那条仍算未读
        assert!(store.has_unviewed(chat.id).await.unwrap());
    }

    #[tokio::test]
    async fn messages_are_newest_first_and_since_filters() {
        let store = MemoryStore::new();
        let (chat, a, _) = chat_between(&store).await;
        let base = Utc::now();
        let mut ids = Vec::new();
        for (i, text) in ["um", "dois", "tres"].iter().enumerate() {
            let date = base + chrono::Duration::seconds(i as i64);
            let msg = message(a.id, text, date);
            ids.push(msg.id);
            store.create_in_chat(chat.id, msg, true).await.unwrap();
        }

        let all = store.messages(chat.id, None).await.unwrap();
        assert_eq!(all[0].message.id, ids[2]);
        assert_eq!(all[2].message.id, ids[0]);

        let since = base + chrono::Duration::seconds(1);
        let recent = store.messages(chat.id, Some(since)).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(
            store.last_message(chat.id, Some(since)).await.unwrap().unwrap().id,
            ids[2]
        );
    }
}

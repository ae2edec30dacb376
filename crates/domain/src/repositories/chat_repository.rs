use async_trait::async_trait;

use crate::chat::Chat;
use crate::errors::RepositoryError;
use crate::value_objects::{ChatId, UserId};

#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// 按无序对唯一，已存在时返回 Conflict。
    async fn create(&self, chat: Chat) -> Result<Chat, RepositoryError>;
    async fn update(&self, chat: Chat) -> Result<Chat, RepositoryError>;
    async fn find_by_id(&self, id: ChatId) -> Result<Option<Chat>, RepositoryError>;

    /// 删除会话并级联删除其消息关联。
    async fn delete(&self, id: ChatId) -> Result<(), RepositoryError>;

    /// 两个用户之间的会话，任一顺序。
    async fn find_between(&self, a: UserId, b: UserId) -> Result<Option<Chat>, RepositoryError>;

    /// 该用户视图标志为 true 的所有会话。
    async fn list_visible_for(&self, user: UserId) -> Result<Vec<Chat>, RepositoryError>;
}

use async_trait::async_trait;

use crate::errors::RepositoryError;
use crate::message::{Message, StoredChatMessage};
use crate::value_objects::{ChatId, MessageId, Timestamp, UserId};

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 创建消息及其会话关联，两者要么都写入要么都不写入。
    async fn create_in_chat(
        &self,
        chat_id: ChatId,
        message: Message,
        visualized: bool,
    ) -> Result<(), RepositoryError>;

    async fn find_message(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;

    /// 会话消息，最新在前。`since` 过滤早于该时刻的消息。
    async fn messages(
        &self,
        chat_id: ChatId,
        since: Option<Timestamp>,
    ) -> Result<Vec<StoredChatMessage>, RepositoryError>;

    async fn amount_of_messages(
        &self,
        chat_id: ChatId,
        since: Option<Timestamp>,
    ) -> Result<u64, RepositoryError>;

    async fn amount_of_unviewed(
        &self,
        chat_id: ChatId,
        excluding_author: UserId,
        since: Option<Timestamp>,
    ) -> Result<u64, RepositoryError>;

    async fn last_message(
        &self,
        chat_id: ChatId,
        since: Option<Timestamp>,
    ) -> Result<Option<Message>, RepositoryError>;

    /// 最早的未读消息（不含 viewer 自己发出的）。
    async fn first_unviewed_message_id(
        &self,
        chat_id: ChatId,
        excluding_author: UserId,
    ) -> Result<Option<MessageId>, RepositoryError>;

    /// 会话中是否存在任何未读消息（不区分作者，导航栏用）。
    async fn has_unviewed(&self, chat_id: ChatId) -> Result<bool, RepositoryError>;

    /// 把他人发出的未读消息全部置为已读，返回更新条数。幂等。
    async fn mark_visualized(
        &self,
        chat_id: ChatId,
        excluding_author: UserId,
    ) -> Result<u64, RepositoryError>;
}

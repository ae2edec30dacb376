//! 消息仓储实现
//!
//! 消息实体与会话关联分两张表，创建走同一事务。`since` 参数统一
//! 处理为 "date 晚于该时刻"，NULL 即不过滤。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, query_scalar, FromRow};
use uuid::Uuid;

use crate::db::DbPool;
use domain::{
    ChatId, Message, MessageBody, MessageId, MessageKind, MessageRepository, RepositoryError,
    StoredChatMessage, Timestamp, UserId,
};

use super::{corrupt, map_sqlx_error};

#[derive(Debug, Clone, FromRow)]
struct DbChatMessage {
    id: Uuid,
    author_id: Uuid,
    kind: String,
    text_content: Option<String>,
    image_path: Option<String>,
    date: DateTime<Utc>,
    visualized: bool,
}

impl DbChatMessage {
    fn into_stored(self) -> Result<StoredChatMessage, RepositoryError> {
        let visualized = self.visualized;
        Ok(StoredChatMessage {
            message: self.into_message()?,
            visualized,
        })
    }

    fn into_message(self) -> Result<Message, RepositoryError> {
        let kind = MessageKind::from_code(&self.kind).map_err(corrupt)?;
        let body = match kind {
            MessageKind::Text => MessageBody::Text {
                text: self.text_content.unwrap_or_default(),
            },
            MessageKind::Image => MessageBody::Image {
                image: self.image_path.unwrap_or_default(),
            },
            MessageKind::Audio => MessageBody::Audio,
            MessageKind::Video => MessageBody::Video,
        };
        Ok(Message {
            id: MessageId::new(self.id),
            author: UserId::new(self.author_id),
            body,
            date: self.date,
        })
    }
}

const SELECT_MESSAGE: &str = "SELECT m.id, m.author_id, m.kind, m.text_content, m.image_path, \
     m.date, cm.visualized FROM messages m \
     JOIN chat_messages cm ON cm.message_id = m.id";

pub struct PgMessageRepository {
    pool: DbPool,
}

impl PgMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create_in_chat(
        &self,
        chat_id: ChatId,
        message: Message,
        visualized: bool,
    ) -> Result<(), RepositoryError> {
        let (text_content, image_path) = match &message.body {
            MessageBody::Text { text } => (Some(text.as_str()), None),
            MessageBody::Image { image } => (None, Some(image.as_str())),
            MessageBody::Audio | MessageBody::Video => (None, None),
        };

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        query(
            "INSERT INTO messages (id, author_id, kind, text_content, image_path, date) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(message.id.0)
        .bind(message.author.0)
        .bind(message.kind().code())
        .bind(text_content)
        .bind(image_path)
        .bind(message.date)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        query(
            "INSERT INTO chat_messages (chat_id, message_id, visualized) VALUES ($1, $2, $3)",
        )
        .bind(chat_id.0)
        .bind(message.id.0)
        .bind(visualized)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_message(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let sql = format!("{SELECT_MESSAGE} WHERE m.id = $1");
        let row = query_as::<_, DbChatMessage>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(DbChatMessage::into_message).transpose()
    }

    async fn messages(
        &self,
        chat_id: ChatId,
        since: Option<Timestamp>,
    ) -> Result<Vec<StoredChatMessage>, RepositoryError> {
        let sql = format!(
            "{SELECT_MESSAGE} WHERE cm.chat_id = $1 \
             AND ($2::timestamptz IS NULL OR m.date > $2) ORDER BY m.date DESC"
        );
        let rows = query_as::<_, DbChatMessage>(&sql)
            .bind(chat_id.0)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(DbChatMessage::into_stored).collect()
    }

    async fn amount_of_messages(
        &self,
        chat_id: ChatId,
        since: Option<Timestamp>,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = query_scalar(
            "SELECT COUNT(*) FROM chat_messages cm JOIN messages m ON m.id = cm.message_id \
             WHERE cm.chat_id = $1 AND ($2::timestamptz IS NULL OR m.date > $2)",
        )
        .bind(chat_id.0)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(count as u64)
    }

    async fn amount_of_unviewed(
        &self,
        chat_id: ChatId,
        excluding_author: UserId,
        since: Option<Timestamp>,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = query_scalar(
            "SELECT COUNT(*) FROM chat_messages cm JOIN messages m ON m.id = cm.message_id \
             WHERE cm.chat_id = $1 AND NOT cm.visualized AND m.author_id <> $2 \
             AND ($3::timestamptz IS NULL OR m.date > $3)",
        )
        .bind(chat_id.0)
        .bind(excluding_author.0)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(count as u64)
    }

    async fn last_message(
        &self,
        chat_id: ChatId,
        since: Option<Timestamp>,
    ) -> Result<Option<Message>, RepositoryError> {
        let sql = format!(
            "{SELECT_MESSAGE} WHERE cm.chat_id = $1 \
             AND ($2::timestamptz IS NULL OR m.date > $2) ORDER BY m.date DESC LIMIT 1"
        );
        let row = query_as::<_, DbChatMessage>(&sql)
            .bind(chat_id.0)
            .bind(since)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(DbChatMessage::into_message).transpose()
    }

    async fn first_unviewed_message_id(
        &self,
        chat_id: ChatId,
        excluding_author: UserId,
    ) -> Result<Option<MessageId>, RepositoryError> {
        let id: Option<Uuid> = query_scalar(
            "SELECT m.id FROM chat_messages cm JOIN messages m ON m.id = cm.message_id \
             WHERE cm.chat_id = $1 AND NOT cm.visualized AND m.author_id <> $2 \
             ORDER BY m.date ASC LIMIT 1",
        )
        .bind(chat_id.0)
        .bind(excluding_author.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(id.map(MessageId::new))
    }

    async fn has_unviewed(&self, chat_id: ChatId) -> Result<bool, RepositoryError> {
        let found: Option<bool> = query_scalar(
            "SELECT TRUE FROM chat_messages WHERE chat_id = $1 AND NOT visualized LIMIT 1",
        )
        .bind(chat_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(found.unwrap_or(false))
    }

    async fn mark_visualized(
        &self,
        chat_id: ChatId,
        excluding_author: UserId,
    ) -> Result<u64, RepositoryError> {
        let result = query(
            "UPDATE chat_messages cm SET visualized = TRUE FROM messages m \
             WHERE m.id = cm.message_id AND cm.chat_id = $1 \
             AND NOT cm.visualized AND m.author_id <> $2",
        )
        .bind(chat_id.0)
        .bind(excluding_author.0)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

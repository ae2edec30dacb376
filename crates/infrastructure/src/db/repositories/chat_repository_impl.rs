//! 会话仓储实现
//!
//! 无序对唯一靠 (LEAST, GREATEST) 上的唯一索引保证；删除会话时
//! 先删其消息实体，关联行随外键级联消失。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, FromRow};
use uuid::Uuid;

use crate::db::DbPool;
use domain::{Chat, ChatId, ChatRepository, RepositoryError, UserId};

use super::map_sqlx_error;

#[derive(Debug, Clone, FromRow)]
struct DbChat {
    id: Uuid,
    user1_id: Uuid,
    user2_id: Uuid,
    user1_view: bool,
    user2_view: bool,
    user1_exit_date: Option<DateTime<Utc>>,
    user2_exit_date: Option<DateTime<Utc>>,
}

impl From<DbChat> for Chat {
    fn from(row: DbChat) -> Self {
        Chat {
            id: ChatId::new(row.id),
            user1: UserId::new(row.user1_id),
            user2: UserId::new(row.user2_id),
            user1_view: row.user1_view,
            user2_view: row.user2_view,
            user1_exit_date: row.user1_exit_date,
            user2_exit_date: row.user2_exit_date,
        }
    }
}

const SELECT_CHAT: &str = "SELECT id, user1_id, user2_id, user1_view, user2_view, \
     user1_exit_date, user2_exit_date FROM chats";

pub struct PgChatRepository {
    pool: DbPool,
}

impl PgChatRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn create(&self, chat: Chat) -> Result<Chat, RepositoryError> {
        query(
            "INSERT INTO chats (id, user1_id, user2_id, user1_view, user2_view, \
             user1_exit_date, user2_exit_date) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(chat.id.0)
        .bind(chat.user1.0)
        .bind(chat.user2.0)
        .bind(chat.user1_view)
        .bind(chat.user2_view)
        .bind(chat.user1_exit_date)
        .bind(chat.user2_exit_date)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(chat)
    }

    async fn update(&self, chat: Chat) -> Result<Chat, RepositoryError> {
        let result = query(
            "UPDATE chats SET user1_view = $2, user2_view = $3, \
             user1_exit_date = $4, user2_exit_date = $5 WHERE id = $1",
        )
        .bind(chat.id.0)
        .bind(chat.user1_view)
        .bind(chat.user2_view)
        .bind(chat.user1_exit_date)
        .bind(chat.user2_exit_date)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(chat)
    }

    async fn find_by_id(&self, id: ChatId) -> Result<Option<Chat>, RepositoryError> {
        let sql = format!("{SELECT_CHAT} WHERE id = $1");
        let row = query_as::<_, DbChat>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Chat::from))
    }

    async fn delete(&self, id: ChatId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        query(
            "DELETE FROM messages WHERE id IN \
             (SELECT message_id FROM chat_messages WHERE chat_id = $1)",
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        query("DELETE FROM chats WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;
        tracing::debug!(chat_id = %id, "会话及其消息已删除");
        Ok(())
    }

    async fn find_between(&self, a: UserId, b: UserId) -> Result<Option<Chat>, RepositoryError> {
        let sql = format!(
            "{SELECT_CHAT} WHERE LEAST(user1_id, user2_id) = LEAST($1, $2) \
             AND GREATEST(user1_id, user2_id) = GREATEST($1, $2)"
        );
        let row = query_as::<_, DbChat>(&sql)
            .bind(a.0)
            .bind(b.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Chat::from))
    }

    async fn list_visible_for(&self, user: UserId) -> Result<Vec<Chat>, RepositoryError> {
        let sql = format!(
            "{SELECT_CHAT} WHERE (user1_id = $1 AND user1_view) \
             OR (user2_id = $1 AND user2_view)"
        );
        let rows = query_as::<_, DbChat>(&sql)
            .bind(user.0)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Chat::from).collect())
    }
}

//! 通知仓储实现
//!
//! 变体（好友请求 / 群请求）同表存储，tag 列区分，群请求多一个
//! group_id。按 id 查找时 tag 不匹配视同不存在。

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{query, query_as, query_scalar, FromRow};
use uuid::Uuid;

use crate::db::DbPool;
use domain::{
    Notification, NotificationId, NotificationKind, NotificationKindTag, NotificationRepository,
    NotificationStatus, RepositoryError, UserId,
};

use super::{corrupt, map_sqlx_error};

#[derive(Debug, Clone, FromRow)]
struct DbNotification {
    id: Uuid,
    author_id: Uuid,
    receiver_id: Uuid,
    author_view: bool,
    receiver_view: bool,
    date: NaiveDate,
    status: String,
    tag: String,
    group_id: Option<i32>,
}

impl DbNotification {
    fn into_notification(self) -> Result<Notification, RepositoryError> {
        let tag = NotificationKindTag::from_code(&self.tag).map_err(corrupt)?;
        let kind = match tag {
            NotificationKindTag::Friendship => NotificationKind::Friendship,
            NotificationKindTag::Group => NotificationKind::Group {
                group: self
                    .group_id
                    .ok_or_else(|| RepositoryError::storage("群请求缺少 group_id"))?,
            },
        };
        Ok(Notification {
            id: NotificationId::new(self.id),
            author: UserId::new(self.author_id),
            receiver: UserId::new(self.receiver_id),
            author_view: self.author_view,
            receiver_view: self.receiver_view,
            date: self.date,
            status: NotificationStatus::from_code(&self.status).map_err(corrupt)?,
            kind,
        })
    }
}

const SELECT_NOTIFICATION: &str = "SELECT id, author_id, receiver_id, author_view, \
     receiver_view, date, status, tag, group_id FROM notifications";

pub struct PgNotificationRepository {
    pool: DbPool,
}

impl PgNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn list_where(
        &self,
        condition: &str,
        user: UserId,
        tag: NotificationKindTag,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let sql = format!(
            "{SELECT_NOTIFICATION} WHERE {condition} AND tag = $2 ORDER BY date DESC, id DESC"
        );
        let rows = query_as::<_, DbNotification>(&sql)
            .bind(user.0)
            .bind(tag.code())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter()
            .map(DbNotification::into_notification)
            .collect()
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn create(&self, notification: Notification) -> Result<Notification, RepositoryError> {
        query(
            "INSERT INTO notifications (id, author_id, receiver_id, author_view, receiver_view, \
             date, status, tag, group_id) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(notification.id.0)
        .bind(notification.author.0)
        .bind(notification.receiver.0)
        .bind(notification.author_view)
        .bind(notification.receiver_view)
        .bind(notification.date)
        .bind(notification.status.code())
        .bind(notification.kind_tag().code())
        .bind(notification.group_id())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(notification)
    }

    async fn update(&self, notification: Notification) -> Result<Notification, RepositoryError> {
        let result = query(
            "UPDATE notifications SET author_view = $2, receiver_view = $3, status = $4 \
             WHERE id = $1",
        )
        .bind(notification.id.0)
        .bind(notification.author_view)
        .bind(notification.receiver_view)
        .bind(notification.status.code())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(notification)
    }

    async fn delete(&self, id: NotificationId) -> Result<(), RepositoryError> {
        query("DELETE FROM notifications WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find(
        &self,
        id: NotificationId,
        tag: NotificationKindTag,
    ) -> Result<Option<Notification>, RepositoryError> {
        let sql = format!("{SELECT_NOTIFICATION} WHERE id = $1 AND tag = $2");
        let row = query_as::<_, DbNotification>(&sql)
            .bind(id.0)
            .bind(tag.code())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(DbNotification::into_notification).transpose()
    }

    async fn list_sent(
        &self,
        author: UserId,
        tag: NotificationKindTag,
    ) -> Result<Vec<Notification>, RepositoryError> {
        self.list_where("author_id = $1 AND author_view", author, tag)
            .await
    }

    async fn list_received(
        &self,
        receiver: UserId,
        tag: NotificationKindTag,
    ) -> Result<Vec<Notification>, RepositoryError> {
        self.list_where("receiver_id = $1 AND receiver_view", receiver, tag)
            .await
    }

    async fn list_finished_authored(
        &self,
        author: UserId,
        tag: NotificationKindTag,
    ) -> Result<Vec<Notification>, RepositoryError> {
        self.list_where("author_id = $1 AND status <> 'P'", author, tag)
            .await
    }

    async fn list_finished_received(
        &self,
        receiver: UserId,
        tag: NotificationKindTag,
    ) -> Result<Vec<Notification>, RepositoryError> {
        self.list_where("receiver_id = $1 AND status <> 'P'", receiver, tag)
            .await
    }

    async fn pending_friendship_exists(
        &self,
        author: UserId,
        receiver: UserId,
    ) -> Result<bool, RepositoryError> {
        let found: Option<bool> = query_scalar(
            "SELECT TRUE FROM notifications WHERE author_id = $1 AND receiver_id = $2 \
             AND tag = 'A' AND status = 'P' LIMIT 1",
        )
        .bind(author.0)
        .bind(receiver.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(found.unwrap_or(false))
    }

    async fn has_pending_for(&self, receiver: UserId) -> Result<bool, RepositoryError> {
        let found: Option<bool> = query_scalar(
            "SELECT TRUE FROM notifications WHERE receiver_id = $1 \
             AND receiver_view AND status = 'P' LIMIT 1",
        )
        .bind(receiver.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(found.unwrap_or(false))
    }
}

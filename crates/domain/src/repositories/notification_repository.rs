use async_trait::async_trait;

use crate::errors::RepositoryError;
use crate::notification::{Notification, NotificationKindTag};
use crate::value_objects::{NotificationId, UserId};

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, notification: Notification) -> Result<Notification, RepositoryError>;
    async fn update(&self, notification: Notification) -> Result<Notification, RepositoryError>;
    async fn delete(&self, id: NotificationId) -> Result<(), RepositoryError>;

    /// 按 id 与变体标签查找；变体不匹配视同不存在。
    async fn find(
        &self,
        id: NotificationId,
        tag: NotificationKindTag,
    ) -> Result<Option<Notification>, RepositoryError>;

    /// 该用户发出的、作者视图可见的通知，最新在前。
    async fn list_sent(
        &self,
        author: UserId,
        tag: NotificationKindTag,
    ) -> Result<Vec<Notification>, RepositoryError>;

    /// 该用户收到的、接收者视图可见的通知，最新在前。
    async fn list_received(
        &self,
        receiver: UserId,
        tag: NotificationKindTag,
    ) -> Result<Vec<Notification>, RepositoryError>;

    /// 该用户作为作者的所有已完结通知。
    async fn list_finished_authored(
        &self,
        author: UserId,
        tag: NotificationKindTag,
    ) -> Result<Vec<Notification>, RepositoryError>;

    /// 该用户作为接收者的所有已完结通知。
    async fn list_finished_received(
        &self,
        receiver: UserId,
        tag: NotificationKindTag,
    ) -> Result<Vec<Notification>, RepositoryError>;

    /// author -> receiver 方向是否已有待处理的好友请求。
    async fn pending_friendship_exists(
        &self,
        author: UserId,
        receiver: UserId,
    ) -> Result<bool, RepositoryError>;

    /// 该用户是否有任何待处理通知（导航栏用）。
    async fn has_pending_for(&self, receiver: UserId) -> Result<bool, RepositoryError>;
}

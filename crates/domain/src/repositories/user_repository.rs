use async_trait::async_trait;

use crate::errors::RepositoryError;
use crate::user::User;
use crate::value_objects::UserId;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn update(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<User>, RepositoryError>;

    /// 好友关系是对称的多对多。
    async fn are_friends(&self, a: UserId, b: UserId) -> Result<bool, RepositoryError>;

    /// 双向建立好友关系，重复添加是幂等的。
    async fn add_friendship(&self, a: UserId, b: UserId) -> Result<(), RepositoryError>;

    /// 清除失效的会话键（在线检查的惰性自愈）。
    async fn clear_session(&self, user: UserId) -> Result<(), RepositoryError>;
}

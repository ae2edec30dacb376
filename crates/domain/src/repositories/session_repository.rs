use async_trait::async_trait;

use crate::errors::RepositoryError;
use crate::value_objects::UserId;

/// 登录会话由外部的认证层管理，核心只消费两个查询：
/// 会话键是否仍然存活（在线推导），以及会话键解析到哪个用户（连接鉴权）。
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn session_exists(&self, key: &str) -> Result<bool, RepositoryError>;
    async fn find_user(&self, key: &str) -> Result<Option<UserId>, RepositoryError>;
}

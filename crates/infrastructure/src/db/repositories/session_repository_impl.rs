//! 登录会话查询
//!
//! 会话由外部认证层写入，这里只读：键是否存活、键属于谁。
//! 带过期时间的会话过期即视为不存在。

use async_trait::async_trait;
use sqlx::query_scalar;
use uuid::Uuid;

use crate::db::DbPool;
use domain::{RepositoryError, SessionRepository, UserId};

use super::map_sqlx_error;

pub struct PgSessionRepository {
    pool: DbPool,
}

impl PgSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn session_exists(&self, key: &str) -> Result<bool, RepositoryError> {
        let found: Option<bool> = query_scalar(
            "SELECT TRUE FROM sessions WHERE key = $1 \
             AND (expires_at IS NULL OR expires_at > NOW())",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(found.unwrap_or(false))
    }

    async fn find_user(&self, key: &str) -> Result<Option<UserId>, RepositoryError> {
        let id: Option<Uuid> = query_scalar(
            "SELECT user_id FROM sessions WHERE key = $1 \
             AND (expires_at IS NULL OR expires_at > NOW())",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(id.map(UserId::new))
    }
}

//! PostgreSQL 仓储实现
//!
//! 枚举一律以线上码存 TEXT（可见性 QU/AA/NM，消息类型 T/I/A/V，
//! 通知状态 P/A/R，变体 A/G），读取时经 from_code 校验。

mod chat_repository_impl;
mod message_repository_impl;
mod notification_repository_impl;
mod session_repository_impl;
mod user_repository_impl;

pub use chat_repository_impl::PgChatRepository;
pub use message_repository_impl::PgMessageRepository;
pub use notification_repository_impl::PgNotificationRepository;
pub use session_repository_impl::PgSessionRepository;
pub use user_repository_impl::PgUserRepository;

use domain::{DomainError, RepositoryError};

/// sqlx 错误到仓储错误；唯一约束冲突单独成类。
pub(crate) fn map_sqlx_error(error: sqlx::Error) -> RepositoryError {
    match &error {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            RepositoryError::conflict(db.message().to_string())
        }
        _ => RepositoryError::storage(error.to_string()),
    }
}

/// 数据库里存了非法码属于存储损坏，不属于领域拒绝。
pub(crate) fn corrupt(error: DomainError) -> RepositoryError {
    RepositoryError::storage(format!("存储的枚举码非法: {error}"))
}

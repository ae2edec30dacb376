//! 领域模型错误定义
//!
//! 校验一律发生在任何写入之前；这里的每个变体都对应一种
//! 对用户可见的拒绝原因，而不是连接级的硬失败。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 操作者不是实体的当事方
    #[error("permission denied: {action}")]
    Forbidden { action: String },

    /// 资源不存在
    #[error("not found: {resource_type} {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    /// 入参无法识别（消息类型、分页参数等），不产生任何写入
    #[error("invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    /// 用户把自己作为目标
    #[error("cannot target yourself")]
    SelfReference,

    /// 双方已经是好友
    #[error("users are already friends")]
    AlreadyFriends,

    /// 已存在同方向的待处理请求
    #[error("a pending request already exists")]
    DuplicateRequest,
}

impl DomainError {
    pub fn forbidden(action: impl Into<String>) -> Self {
        Self::Forbidden {
            action: action.into(),
        }
    }

    pub fn not_found(resource_type: impl Into<String>, resource_id: impl ToString) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            resource_id: resource_id.to_string(),
        }
    }

    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 实体存储错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

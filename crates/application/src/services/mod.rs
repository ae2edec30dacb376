//! 用例服务
//!
//! 写路径编排器：校验、落库、然后显式扇出。发布永远发生在写入
//! 成功之后，发布失败不回滚也不重试写入。

mod chat_service;
mod notification_service;

#[cfg(test)]
mod chat_service_tests;
#[cfg(test)]
mod notification_service_tests;

pub use chat_service::{ChatService, ChatServiceDependencies, GetMessagesRequest, SendMessageRequest};
pub use notification_service::{
    NotificationPanel, NotificationService, NotificationServiceDependencies, ReplyRequest,
};

use std::sync::Arc;

use crate::error::ApplicationError;
use domain::{UserId, UserRepository};

/// 好友关系查询，可见性解析的输入之一。
#[derive(Clone)]
pub struct FriendLookup {
    users: Arc<dyn UserRepository>,
}

impl FriendLookup {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    pub async fn are_friends(&self, a: UserId, b: UserId) -> Result<bool, ApplicationError> {
        Ok(self.users.are_friends(a, b).await?)
    }
}

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ChatId, Timestamp, UserId};

/// 会话中的席位。会话是无序对，但两个视图标志各自独立。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatSide {
    User1,
    User2,
}

/// 两个不同用户之间的一对一会话，按无序对唯一。
///
/// 不变式：两个视图标志都为 false 的会话会被删除而不是保留；
/// 会话身份一旦创建不再改变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub user1: UserId,
    pub user2: UserId,
    pub user1_view: bool,
    pub user2_view: bool,
    pub user1_exit_date: Option<Timestamp>,
    pub user2_exit_date: Option<Timestamp>,
}

impl Chat {
    pub fn new(id: ChatId, user1: UserId, user2: UserId) -> Result<Self, DomainError> {
        if user1 == user2 {
            return Err(DomainError::SelfReference);
        }
        Ok(Self {
            id,
            user1,
            user2,
            user1_view: true,
            user2_view: true,
            user1_exit_date: None,
            user2_exit_date: None,
        })
    }

    pub fn side_of(&self, user: UserId) -> Option<ChatSide> {
        if self.user1 == user {
            Some(ChatSide::User1)
        } else if self.user2 == user {
            Some(ChatSide::User2)
        } else {
            None
        }
    }

    pub fn is_participant(&self, user: UserId) -> bool {
        self.side_of(user).is_some()
    }

    pub fn other_user(&self, user: UserId) -> Result<UserId, DomainError> {
        match self.side_of(user) {
            Some(ChatSide::User1) => Ok(self.user2),
            Some(ChatSide::User2) => Ok(self.user1),
            None => Err(DomainError::forbidden("user is not part of this chat")),
        }
    }

    pub fn view_flag(&self, side: ChatSide) -> bool {
        match side {
            ChatSide::User1 => self.user1_view,
            ChatSide::User2 => self.user2_view,
        }
    }

    pub fn set_view_flag(&mut self, side: ChatSide, value: bool) {
        match side {
            ChatSide::User1 => self.user1_view = value,
            ChatSide::User2 => self.user2_view = value,
        }
    }

    pub fn exit_date(&self, side: ChatSide) -> Option<Timestamp> {
        match side {
            ChatSide::User1 => self.user1_exit_date,
            ChatSide::User2 => self.user2_exit_date,
        }
    }

    /// 用户把会话从自己的列表里移除：视图标志置 false，记录退出时刻。
    /// 退出时刻之后会用来过滤历史，回归的用户只看到退出之后的消息。
    pub fn leave(&mut self, user: UserId, now: Timestamp) -> Result<(), DomainError> {
        let side = self
            .side_of(user)
            .ok_or_else(|| DomainError::forbidden("user is not part of this chat"))?;
        self.set_view_flag(side, false);
        match side {
            ChatSide::User1 => self.user1_exit_date = Some(now),
            ChatSide::User2 => self.user2_exit_date = Some(now),
        }
        Ok(())
    }

    pub fn is_visible_to(&self, user: UserId) -> bool {
        self.side_of(user).map(|s| self.view_flag(s)).unwrap_or(false)
    }

    /// 双方都移除后会话不再被任何人看见，应当整体删除。
    pub fn is_orphaned(&self) -> bool {
        !self.user1_view && !self.user2_view
    }
}

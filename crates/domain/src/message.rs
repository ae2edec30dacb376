use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{MessageId, Timestamp, UserId};

/// 消息类型标签，构造时固定，线上码为 T / I / A / V。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Video,
}

impl MessageKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::Text => "T",
            Self::Image => "I",
            Self::Audio => "A",
            Self::Video => "V",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, DomainError> {
        match code {
            "T" => Ok(Self::Text),
            "I" => Ok(Self::Image),
            "A" => Ok(Self::Audio),
            "V" => Ok(Self::Video),
            other => Err(DomainError::invalid_input(
                "message_type",
                format!("unknown code '{other}'"),
            )),
        }
    }
}

/// 消息内容。Audio / Video 在类型全集中声明，但没有可构造的内容表示，
/// 所有消费点都必须对这两个分支做显式处理。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text { text: String },
    Image { image: String },
    Audio,
    Video,
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::Image { .. } => MessageKind::Image,
            Self::Audio => MessageKind::Audio,
            Self::Video => MessageKind::Video,
        }
    }

    pub fn text(text: impl Into<String>) -> Result<Self, DomainError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DomainError::invalid_input("text", "cannot be empty"));
        }
        Ok(Self::Text { text })
    }

    pub fn image(path: impl Into<String>) -> Result<Self, DomainError> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(DomainError::invalid_input("image", "cannot be empty"));
        }
        Ok(Self::Image { image: path })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub author: UserId,
    pub body: MessageBody,
    pub date: Timestamp,
}

impl Message {
    pub fn new(id: MessageId, author: UserId, body: MessageBody, date: Timestamp) -> Self {
        Self {
            id,
            author,
            body,
            date,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    pub fn is_author(&self, user: UserId) -> bool {
        self.author == user
    }
}

/// 消息与会话的关联实体，按 (chat, message) 对唯一。
/// `visualized` 是对方是否已读的标记，与任何全局未读计数无关。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChatMessage {
    pub message: Message,
    pub visualized: bool,
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{NotificationId, UserId};

/// 通知状态，线上码 P / A / R。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl NotificationStatus {
    pub fn code(self) -> &'static str {
        match self {
            Self::Pending => "P",
            Self::Accepted => "A",
            Self::Rejected => "R",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, DomainError> {
        match code {
            "P" => Ok(Self::Pending),
            "A" => Ok(Self::Accepted),
            "R" => Ok(Self::Rejected),
            other => Err(DomainError::invalid_input(
                "status",
                format!("unknown code '{other}'"),
            )),
        }
    }

    /// 展示文案，仅由表现层消费。
    pub fn display(self) -> &'static str {
        match self {
            Self::Pending => "Pendente",
            Self::Accepted => "Aceito",
            Self::Rejected => "Recusado",
        }
    }
}

/// 通知的变体。群组实体尚未实现，这里保留整数占位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    Friendship,
    Group { group: i32 },
}

/// 按变体查找时使用的判别标签，线上码 A（好友）/ G（群组）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKindTag {
    Friendship,
    Group,
}

impl NotificationKindTag {
    pub fn code(self) -> &'static str {
        match self {
            Self::Friendship => "A",
            Self::Group => "G",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, DomainError> {
        match code {
            "A" => Ok(Self::Friendship),
            "G" => Ok(Self::Group),
            other => Err(DomainError::invalid_input(
                "notification_type",
                format!("unknown code '{other}'"),
            )),
        }
    }
}

/// 好友/群组请求通知。
///
/// 不变式：已完结（非 pending）且双方视图标志都为 false 的通知会被删除。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub author: UserId,
    pub receiver: UserId,
    pub author_view: bool,
    pub receiver_view: bool,
    /// 创建日期，天粒度。
    pub date: NaiveDate,
    pub status: NotificationStatus,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn friendship_request(
        id: NotificationId,
        author: UserId,
        receiver: UserId,
        date: NaiveDate,
    ) -> Result<Self, DomainError> {
        Self::new(id, author, receiver, date, NotificationKind::Friendship)
    }

    pub fn group_request(
        id: NotificationId,
        author: UserId,
        receiver: UserId,
        date: NaiveDate,
        group: i32,
    ) -> Result<Self, DomainError> {
        Self::new(id, author, receiver, date, NotificationKind::Group { group })
    }

    fn new(
        id: NotificationId,
        author: UserId,
        receiver: UserId,
        date: NaiveDate,
        kind: NotificationKind,
    ) -> Result<Self, DomainError> {
        if author == receiver {
            return Err(DomainError::SelfReference);
        }
        Ok(Self {
            id,
            author,
            receiver,
            author_view: true,
            receiver_view: true,
            date,
            status: NotificationStatus::Pending,
            kind,
        })
    }

    pub fn kind_tag(&self) -> NotificationKindTag {
        match self.kind {
            NotificationKind::Friendship => NotificationKindTag::Friendship,
            NotificationKind::Group { .. } => NotificationKindTag::Group,
        }
    }

    pub fn group_id(&self) -> Option<i32> {
        match self.kind {
            NotificationKind::Friendship => None,
            NotificationKind::Group { group } => Some(group),
        }
    }

    pub fn is_author(&self, user: UserId) -> bool {
        self.author == user
    }

    pub fn is_receiver(&self, user: UserId) -> bool {
        self.receiver == user
    }

    pub fn is_finished(&self) -> bool {
        self.status != NotificationStatus::Pending
    }

    pub fn accept(&mut self) {
        self.status = NotificationStatus::Accepted;
    }

    pub fn reject(&mut self) {
        self.status = NotificationStatus::Rejected;
    }

    /// 双方都不再看见时应当删除，而不是留下墓碑。
    pub fn should_be_deleted(&self) -> bool {
        !self.author_view && !self.receiver_view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Notification {
        Notification::friendship_request(
            NotificationId::generate(),
            UserId::generate(),
            UserId::generate(),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_self_request() {
        let user = UserId::generate();
        let result = Notification::friendship_request(
            NotificationId::generate(),
            user,
            user,
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        );
        assert_eq!(result, Err(DomainError::SelfReference));
    }

    #[test]
    fn finished_after_reply() {
        let mut n = request();
        assert!(!n.is_finished());
        n.accept();
        assert!(n.is_finished());
        assert_eq!(n.status.display(), "Aceito");
    }

    #[test]
    fn deleted_when_both_views_cleared() {
        let mut n = request();
        n.reject();
        n.author_view = false;
        assert!(!n.should_be_deleted());
        n.receiver_view = false;
        assert!(n.should_be_deleted());
    }

    #[test]
    fn group_id_only_for_group_requests() {
        let n = request();
        assert_eq!(n.group_id(), None);
        assert_eq!(n.kind_tag(), NotificationKindTag::Friendship);

        let g = Notification::group_request(
            NotificationId::generate(),
            UserId::generate(),
            UserId::generate(),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            7,
        )
        .unwrap();
        assert_eq!(g.group_id(), Some(7));
        assert_eq!(g.kind_tag(), NotificationKindTag::Group);
    }
}

//! 可见性策略引擎
//!
//! 纯函数：把 (配置, 是否好友, [是否在线]) 映射为披露结果。
//! 配置值始终是裸枚举码，展示文案属于表现层，这里不涉及。

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// 每个资料属性的可见性配置，存储码为 QU / AA / NM。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityChoice {
    Anyone,
    FriendsOnly,
    Nobody,
}

impl VisibilityChoice {
    pub fn code(self) -> &'static str {
        match self {
            Self::Anyone => "QU",
            Self::FriendsOnly => "AA",
            Self::Nobody => "NM",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, DomainError> {
        match code {
            "QU" => Ok(Self::Anyone),
            "AA" => Ok(Self::FriendsOnly),
            "NM" => Ok(Self::Nobody),
            other => Err(DomainError::invalid_input(
                "visibility",
                format!("unknown code '{other}'"),
            )),
        }
    }
}

/// `online` 属性的披露结果。Hidden 表示连 离线/在线 这件事本身都不披露。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnlineDisclosure {
    Online,
    Offline,
    Hidden,
}

impl OnlineDisclosure {
    /// 模板里使用的状态 class 名。
    pub fn as_class(self) -> &'static str {
        match self {
            Self::Online => "online-status",
            Self::Offline => "offline-status",
            Self::Hidden => "nobody-status",
        }
    }
}

/// `online` 属性的披露表。
pub fn resolve_online(
    choice: VisibilityChoice,
    viewer_is_friend: bool,
    subject_is_online: bool,
) -> OnlineDisclosure {
    use VisibilityChoice::*;
    match (choice, viewer_is_friend, subject_is_online) {
        (Anyone, _, true) => OnlineDisclosure::Online,
        (Anyone, _, false) => OnlineDisclosure::Offline,
        (FriendsOnly, true, true) => OnlineDisclosure::Online,
        (FriendsOnly, true, false) => OnlineDisclosure::Offline,
        (FriendsOnly, false, _) => OnlineDisclosure::Hidden,
        (Nobody, _, _) => OnlineDisclosure::Hidden,
    }
}

/// `status` / `email` / `photo` 属性的披露表。
pub fn resolve_attribute(choice: VisibilityChoice, viewer_is_friend: bool) -> bool {
    use VisibilityChoice::*;
    match (choice, viewer_is_friend) {
        (Anyone, _) => true,
        (FriendsOnly, is_friend) => is_friend,
        (Nobody, _) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::OnlineDisclosure::*;
    use super::VisibilityChoice::*;
    use super::*;

    #[test]
    fn online_table_anyone() {
        assert_eq!(resolve_online(Anyone, true, true), Online);
        assert_eq!(resolve_online(Anyone, true, false), Offline);
        assert_eq!(resolve_online(Anyone, false, true), Online);
        assert_eq!(resolve_online(Anyone, false, false), Offline);
    }

    #[test]
    fn online_table_friends_only() {
        assert_eq!(resolve_online(FriendsOnly, true, true), Online);
        assert_eq!(resolve_online(FriendsOnly, true, false), Offline);
        assert_eq!(resolve_online(FriendsOnly, false, true), Hidden);
        assert_eq!(resolve_online(FriendsOnly, false, false), Hidden);
    }

    #[test]
    fn online_table_nobody() {
        assert_eq!(resolve_online(Nobody, true, true), Hidden);
        assert_eq!(resolve_online(Nobody, true, false), Hidden);
        assert_eq!(resolve_online(Nobody, false, true), Hidden);
        assert_eq!(resolve_online(Nobody, false, false), Hidden);
    }

    // status / email / photo 共用同一张表，每个格子单独断言。
    #[test]
    fn attribute_table() {
        for _attribute in ["status", "email", "photo"] {
            assert!(resolve_attribute(Anyone, true));
            assert!(resolve_attribute(Anyone, false));
            assert!(resolve_attribute(FriendsOnly, true));
            assert!(!resolve_attribute(FriendsOnly, false));
            assert!(!resolve_attribute(Nobody, true));
            assert!(!resolve_attribute(Nobody, false));
        }
    }

    #[test]
    fn codes_round_trip() {
        for choice in [Anyone, FriendsOnly, Nobody] {
            assert_eq!(VisibilityChoice::from_code(choice.code()).unwrap(), choice);
        }
        assert!(VisibilityChoice::from_code("??").is_err());
    }

    #[test]
    fn disclosure_classes() {
        assert_eq!(Online.as_class(), "online-status");
        assert_eq!(Offline.as_class(), "offline-status");
        assert_eq!(Hidden.as_class(), "nobody-status");
    }
}

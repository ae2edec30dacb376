use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;
use crate::visibility::VisibilityChoice;

/// 每个用户四项相互独立的资料可见性配置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilitySettings {
    pub email: VisibilityChoice,
    pub status: VisibilityChoice,
    pub photo: VisibilityChoice,
    pub online: VisibilityChoice,
}

impl Default for VisibilitySettings {
    fn default() -> Self {
        Self {
            email: VisibilityChoice::Anyone,
            status: VisibilityChoice::Anyone,
            photo: VisibilityChoice::Anyone,
            online: VisibilityChoice::Anyone,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub slug: String,
    /// 个人签名。
    pub status_text: String,
    /// 头像路径，文件存储由外部负责。
    pub photo: Option<String>,
    pub visibility: VisibilitySettings,
    /// 登录会话键。在线状态由它是否仍指向存活会话推导，不单独存储。
    #[serde(skip_serializing)]
    pub session_key: Option<String>,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>, email: impl Into<String>) -> Self {
        let username = username.into();
        let slug = slugify(&username);
        Self {
            id,
            username,
            email: email.into(),
            slug,
            status_text: String::new(),
            photo: None,
            visibility: VisibilitySettings::default(),
            session_key: None,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.username
    }
}

/// 用户名到 slug 的固定规则：小写、空白折叠为连字符。
fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut last_dash = true;
    for ch in value.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_from_username() {
        let user = User::new(UserId::generate(), "Maria Clara", "maria@example.com");
        assert_eq!(user.slug, "maria-clara");
    }

    #[test]
    fn default_visibility_is_anyone() {
        let user = User::new(UserId::generate(), "joao", "joao@example.com");
        assert_eq!(user.visibility.online, VisibilityChoice::Anyone);
        assert_eq!(user.visibility.photo, VisibilityChoice::Anyone);
    }
}

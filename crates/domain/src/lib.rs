//! 即时通讯系统核心领域模型
//!
//! 包含用户、会话（chat）、消息、通知等核心实体，
//! 可见性策略引擎，以及实体存储的接口定义。

pub mod chat;
pub mod errors;
pub mod message;
pub mod notification;
pub mod repositories;
pub mod user;
pub mod value_objects;
pub mod visibility;

// 重新导出常用类型
pub use chat::*;
pub use errors::*;
pub use message::*;
pub use notification::*;
pub use repositories::*;
pub use user::*;
pub use value_objects::*;
pub use visibility::*;

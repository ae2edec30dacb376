//! 实体存储接口
//!
//! 持久化是外部协作者，这里只定义核心消费的 CRUD 与派生查询。

mod chat_repository;
mod message_repository;
mod notification_repository;
mod session_repository;
mod user_repository;

pub use chat_repository::ChatRepository;
pub use message_repository::MessageRepository;
pub use notification_repository::NotificationRepository;
pub use session_repository::SessionRepository;
pub use user_repository::UserRepository;

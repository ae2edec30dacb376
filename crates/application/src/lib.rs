//! 应用服务层
//!
//! 聚合领域规则为用例级操作：消息发送/分页、会话移除、好友请求的
//! 生命周期，以及写路径落库之后的逐频道扇出。所有依赖都以 trait
//! 注入，内存实现（MemoryStore、LocalEventBus、MemoryPresenceTracker）
//! 与持久化实现可以互换。

pub mod clock;
pub mod dto;
pub mod error;
pub mod fanout;
pub mod memory;
pub mod presence;
pub mod render;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use dto::{
    format_message_date, local_naive, message_separator, preview_text, ChatListFrame,
    ChatSessionFrame, ChatSummary, MessagePage, NotificationCreateFrame, NotificationDto,
    NotificationUpdateFrame, RenderedMessage,
};
pub use error::ApplicationError;
pub use fanout::{
    Channel, ChatMessageEvent, EventBus, EventStream, FanoutEvent, InboxMessageEvent,
    LocalEventBus, NotificationEvent,
};
pub use memory::MemoryStore;
pub use presence::{MemoryPresenceTracker, OnlineStatus, PresenceTracker};
pub use render::Renderer;
pub use services::{
    ChatService, ChatServiceDependencies, FriendLookup, GetMessagesRequest, NotificationPanel,
    NotificationService, NotificationServiceDependencies, ReplyRequest, SendMessageRequest,
};

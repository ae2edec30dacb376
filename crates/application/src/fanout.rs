//! 按频道扇出的发布/订阅总线
//!
//! 频道按 用户 × 上下文 命名，同一用户打开的多个视图（会话列表、
//! 单个会话、通知面板、导航栏）各自只收到与该视图相关的事件。
//! 投递语义：对当前订阅的连接至多一次，无持久化无重放——发布时
//! 没有订阅者，事件即丢失（写入已经落库，实时投递只是便利层）。

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use domain::{ChatId, MessageId, MessageKind, NotificationId, NotificationKindTag, Timestamp, UserId};

/// 扇出目的地。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// 某用户打开的某个会话视图。
    Chat { user: UserId, chat: ChatId },
    /// 某用户的会话列表视图。
    Inbox { user: UserId },
    /// 某用户的通知面板。
    Notifications { user: UserId },
    /// 某用户的导航栏指示器。
    Navbar { user: UserId },
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat { user, chat } => write!(f, "user:{user}:chat:{chat}"),
            Self::Inbox { user } => write!(f, "user:{user}:inbox"),
            Self::Notifications { user } => write!(f, "user:{user}:notifications"),
            Self::Navbar { user } => write!(f, "user:{user}:navbar"),
        }
    }
}

/// 发往会话列表频道的消息事件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxMessageEvent {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub author_name: String,
    pub kind: MessageKind,
    pub unviewed_count: u64,
    pub date: Timestamp,
    /// 该会话此前不在接收方列表里（视图标志经历 false -> true）。
    pub new_chat: bool,
}

/// 发往单会话频道的消息事件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageEvent {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub kind: MessageKind,
    pub is_author: bool,
}

/// 通知创建/更新事件，消费方按需回查实体。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub notification_id: NotificationId,
    pub tag: NotificationKindTag,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FanoutEvent {
    InboxMessage(InboxMessageEvent),
    ChatMessage(ChatMessageEvent),
    NotificationCreated(NotificationEvent),
    NotificationUpdated(NotificationEvent),
    NavbarChatUnviewed { value: bool },
    NavbarPendingNotifications { value: bool },
}

#[async_trait::async_trait]
pub trait EventBus: Send + Sync {
    fn subscribe(&self, channel: Channel) -> EventStream;

    /// 发布即广播，不等待订阅者处理。没有订阅者时静默丢弃。
    async fn publish(&self, channel: Channel, event: FanoutEvent);
}

/// 单进程实现：每个频道一个 broadcast sender，频道内保序（FIFO），
/// 跨频道不保证任何顺序。分布式 broker 可以放在同一个接口后面。
pub struct LocalEventBus {
    capacity: usize,
    channels: Mutex<HashMap<Channel, broadcast::Sender<FanoutEvent>>>,
}

impl LocalEventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait::async_trait]
impl EventBus for LocalEventBus {
    fn subscribe(&self, channel: Channel) -> EventStream {
        let mut channels = self.channels.lock().expect("fanout lock poisoned");
        let sender = channels
            .entry(channel)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        EventStream {
            receiver: sender.subscribe(),
        }
    }

    async fn publish(&self, channel: Channel, event: FanoutEvent) {
        let mut channels = self.channels.lock().expect("fanout lock poisoned");
        if let Some(sender) = channels.get(&channel) {
            if sender.send(event).is_err() {
                // 所有订阅者都已断开，回收频道条目
                channels.remove(&channel);
                tracing::debug!(channel = %channel, "发布时无订阅者，事件丢弃");
            }
        } else {
            tracing::debug!(channel = %channel, "发布时频道不存在，事件丢弃");
        }
    }
}

/// 单个订阅的事件流。
pub struct EventStream {
    receiver: broadcast::Receiver<FanoutEvent>,
}

impl EventStream {
    /// 下一个事件；订阅被关闭时返回 None。落后于 buffer 的事件按
    /// 至多一次语义直接跳过。
    pub async fn recv(&mut self) -> Option<FanoutEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "事件流滞后，跳过积压事件");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// 非阻塞读取，测试用。
    pub fn try_recv(&mut self) -> Option<FanoutEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

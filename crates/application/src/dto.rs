//! 出站帧与展示辅助
//!
//! 会话/列表/通知频道推给客户端的 JSON 载荷，以及列表预览所需的
//! 文案格式化。日期展示规则：消息在"今天"显示 `HH:MM`，否则
//! `DD/MM/YYYY`；历史分隔符用 "Hoje"/"Ontem"/日期。"今天"按
//! 服务器本地时区的日历日判定。

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use domain::{
    ChatId, MessageBody, MessageId, MessageKind, Notification, NotificationId,
    NotificationKindTag, Timestamp,
};

/// 列表预览最长字符数，超出截断。
const PREVIEW_LIMIT: usize = 50;

/// 消息类型到列表预览文案。文本取内容前 50 个字符，其余类型用
/// 固定标签。
pub fn preview_text(body: &MessageBody) -> String {
    match body {
        MessageBody::Text { text } => text.chars().take(PREVIEW_LIMIT).collect(),
        MessageBody::Image { .. } => "Foto".to_string(),
        MessageBody::Video => "Video".to_string(),
        MessageBody::Audio => "Audio".to_string(),
    }
}

/// 展示用时间先换算到服务器时区，"今天"按本地日历日判定。
pub fn local_naive(date: Timestamp) -> NaiveDateTime {
    date.with_timezone(&Local).naive_local()
}

/// 列表条目的时间文案：当天只给时刻，跨天给完整日期。
pub fn format_message_date(date: NaiveDateTime, now: NaiveDateTime) -> String {
    if date.date() == now.date() {
        date.format("%H:%M").to_string()
    } else {
        date.format("%d/%m/%Y").to_string()
    }
}

/// 历史消息的日期分隔符。
pub fn message_separator(message_date: NaiveDate, today: NaiveDate) -> String {
    if message_date == today {
        "Hoje".to_string()
    } else if today.pred_opt() == Some(message_date) {
        "Ontem".to_string()
    } else {
        message_date.format("%d/%m/%Y").to_string()
    }
}

/// 单会话频道推送的帧。音频/视频没有渲染器，内容为 null。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSessionFrame {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub message_type: MessageKind,
    pub is_author: bool,
    pub rendered_content: Option<String>,
}

/// 会话列表频道推送的帧。`action` 为 "create"/"update"，create
/// 额外携带整行渲染结果供客户端插入。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatListFrame {
    pub action: String,
    pub chat_id: ChatId,
    pub author_name: String,
    pub preview: String,
    pub unviewed_count: u64,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_row: Option<String>,
}

/// GET 会话列表里的一条。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub chat_id: ChatId,
    pub other_user_name: String,
    pub other_user_slug: String,
    /// 已按对方 photo 可见性裁剪。
    pub other_user_photo: Option<String>,
    /// 对方 online 可见性解析出的样式类。
    pub online_class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_date: Option<String>,
    pub unviewed_count: u64,
}

/// 历史页里的一条已渲染消息，倒序（最新在前）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub message_id: MessageId,
    pub message_type: MessageKind,
    pub is_author: bool,
    pub rendered_content: Option<String>,
    pub date: Timestamp,
    /// 与上一条不同日时给出的日期分隔符。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub page: u32,
    /// 本次请求实际使用的页大小，未读拉升时大于配置值。
    pub effective_page_size: u32,
    pub has_more: bool,
    pub messages: Vec<RenderedMessage>,
}

/// 通知实体的序列化视图。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDto {
    pub id: NotificationId,
    pub author_view: bool,
    pub receiver_view: bool,
    pub date: NaiveDate,
    pub status: String,
    pub status_display: String,
}

impl NotificationDto {
    pub fn from_entity(notification: &Notification) -> Self {
        Self {
            id: notification.id,
            author_view: notification.author_view,
            receiver_view: notification.receiver_view,
            date: notification.date,
            status: notification.status.code().to_string(),
            status_display: notification.status.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationCreateFrame {
    pub notification: NotificationDto,
    pub tag: NotificationKindTag,
    pub is_author: bool,
    pub rendered: String,
}

/// 状态/可见性变更帧，只投递给作者在线连接。群通知带群 id，
/// 好友请求为 null。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationUpdateFrame {
    pub id: NotificationId,
    pub tag: NotificationKindTag,
    pub group_id: Option<i32>,
    pub status_display: String,
    pub is_finished: bool,
}

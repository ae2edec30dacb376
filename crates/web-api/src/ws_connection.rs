//! WebSocket 会话
//!
//! 四类会话共用一个运行循环：打开时订阅自己的频道（会话类会话还
//! 登记在场标记），循环里把总线事件转成出站帧，关闭时同步释放
//! 在场标记和订阅。圈内事件一次处理一个，处理完才取下一个。

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::json;

use application::{ApplicationError, Channel, FanoutEvent};
use domain::{ChatId, DomainError, UserId};

use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
pub enum SessionKind {
    Chat { chat: ChatId },
    Inbox,
    Notifications,
    Navbar,
}

impl SessionKind {
    fn channel(self, user: UserId) -> Channel {
        match self {
            Self::Chat { chat } => Channel::Chat { user, chat },
            Self::Inbox => Channel::Inbox { user },
            Self::Notifications => Channel::Notifications { user },
            Self::Navbar => Channel::Navbar { user },
        }
    }
}

pub async fn run(socket: WebSocket, state: AppState, user: UserId, kind: SessionKind) {
    let mut stream = state.bus.subscribe(kind.channel(user));

    if let SessionKind::Chat { chat } = kind {
        if let Err(err) = state.presence.mark_entered(user, chat).await {
            tracing::error!(error = %err, user_id = %user, chat_id = %chat, "登记在场失败，拒绝会话");
            return;
        }
    }
    tracing::info!(user_id = %user, kind = ?kind, "WebSocket 会话已打开");

    let (mut sender, mut receiver) = socket.split();

    if let SessionKind::Navbar = kind {
        if let Err(err) = send_navbar_snapshot(&state, user, &mut sender).await {
            tracing::warn!(error = %err, "导航栏初始帧发送失败");
        }
    }

    loop {
        tokio::select! {
            inbound = receiver.next() => match inbound {
                None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => break,
                Some(Ok(WsMessage::Ping(data))) => {
                    if sender.send(WsMessage::Pong(data)).await.is_err() {
                        break;
                    }
                }
                // 这些会话没有入站协议，其余帧忽略
                Some(Ok(_)) => {}
            },
            event = stream.recv() => match event {
                None => break,
                Some(event) => match build_frame(&state, user, kind, &event).await {
                    Ok(Some(frame)) => {
                        if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    // 事件到达前实体可能已被删除，跳过即可
                    Err(ApplicationError::Domain(DomainError::NotFound { .. })) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "出站帧构建失败");
                    }
                },
            },
        }
    }

    // 在场标记必须随断开同步释放，泄漏会让发送方误判接收方在场
    if let SessionKind::Chat { chat } = kind {
        if let Err(err) = state.presence.mark_exited(user, chat).await {
            tracing::error!(error = %err, user_id = %user, chat_id = %chat, "释放在场标记失败");
        }
    }
    drop(stream);
    tracing::info!(user_id = %user, kind = ?kind, "WebSocket 会话已关闭");
}

/// 事件 -> 出站帧 JSON；返回 None 表示该事件与此观看者无关。
async fn build_frame(
    state: &AppState,
    user: UserId,
    kind: SessionKind,
    event: &FanoutEvent,
) -> Result<Option<String>, ApplicationError> {
    match (kind, event) {
        (SessionKind::Chat { .. }, FanoutEvent::ChatMessage(ev)) => {
            let frame = state.chat_service.chat_frame(user, ev).await?;
            Ok(Some(tagged("message-created", &frame)))
        }
        (SessionKind::Inbox, FanoutEvent::InboxMessage(ev)) => {
            let frame = state.chat_service.inbox_frame(user, ev).await?;
            Ok(Some(tagged("chat-updated", &frame)))
        }
        (SessionKind::Notifications, FanoutEvent::NotificationCreated(ev)) => {
            let frame = state.notification_service.create_frame(user, ev).await?;
            Ok(Some(tagged("notification-create", &frame)))
        }
        (SessionKind::Notifications, FanoutEvent::NotificationUpdated(ev)) => {
            Ok(state
                .notification_service
                .update_frame(user, ev)
                .await?
                .map(|frame| tagged("notification-update", &frame)))
        }
        (SessionKind::Navbar, FanoutEvent::NavbarChatUnviewed { value }) => Ok(Some(
            json!({ "type": "chat-unviewed", "value": value }).to_string(),
        )),
        (SessionKind::Navbar, FanoutEvent::NavbarPendingNotifications { value }) => Ok(Some(
            json!({ "type": "pending-notifications", "value": value }).to_string(),
        )),
        // 频道按会话类型隔离，错配只可能来自总线误用
        _ => {
            tracing::warn!(kind = ?kind, "频道上出现了不属于该会话类型的事件");
            Ok(None)
        }
    }
}

fn tagged<T: Serialize>(frame_type: &str, frame: &T) -> String {
    let mut value = serde_json::to_value(frame).unwrap_or_else(|_| json!({}));
    if let Some(object) = value.as_object_mut() {
        object.insert("type".to_string(), json!(frame_type));
    }
    value.to_string()
}

async fn send_navbar_snapshot(
    state: &AppState,
    user: UserId,
    sender: &mut (impl SinkExt<WsMessage> + Unpin),
) -> Result<(), ApplicationError> {
    let chat_flag = state.chat_service.unviewed_flag(user).await?;
    let pending = state.notification_service.pending_flag(user).await?;
    for frame in [
        json!({ "type": "chat-unviewed", "value": chat_flag }).to_string(),
        json!({ "type": "pending-notifications", "value": pending }).to_string(),
    ] {
        if sender.send(WsMessage::Text(frame.into())).await.is_err() {
            break;
        }
    }
    Ok(())
}

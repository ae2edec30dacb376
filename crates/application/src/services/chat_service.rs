//! 会话用例：列表、历史分页、发消息、移除，以及各频道帧的构建。

use std::sync::Arc;

use serde_json::json;

use crate::clock::Clock;
use crate::dto::{
    format_message_date, local_naive, message_separator, preview_text, ChatListFrame,
    ChatSessionFrame, ChatSummary, MessagePage, RenderedMessage,
};
use crate::error::ApplicationError;
use crate::fanout::{Channel, ChatMessageEvent, EventBus, FanoutEvent, InboxMessageEvent};
use crate::presence::{OnlineStatus, PresenceTracker};
use crate::render::Renderer;
use crate::services::FriendLookup;
use domain::{
    resolve_attribute, resolve_online, Chat, ChatId, ChatRepository, DomainError, Message,
    MessageBody, MessageId, MessageKind, MessageRepository, UserId, UserRepository,
};

pub struct ChatServiceDependencies {
    pub users: Arc<dyn UserRepository>,
    pub chats: Arc<dyn ChatRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub presence: Arc<dyn PresenceTracker>,
    pub online: OnlineStatus,
    pub friends: FriendLookup,
    pub bus: Arc<dyn EventBus>,
    pub renderer: Arc<dyn Renderer>,
    pub clock: Arc<dyn Clock>,
    /// 历史分页的配置页大小，未读拉升时临时放大。
    pub messages_per_page: u32,
}

pub struct SendMessageRequest {
    pub chat_id: ChatId,
    pub author: UserId,
    pub kind: MessageKind,
    /// 文本内容或图片路径。音频/视频没有内容表示，忽略。
    pub content: Option<String>,
}

pub struct GetMessagesRequest {
    pub chat_id: ChatId,
    pub requester: UserId,
    /// 从 1 开始。
    pub page: u32,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    /// 当前用户视图标志为 true 的会话，按最后一条消息时间倒序。
    pub async fn list_chats(&self, user: UserId) -> Result<Vec<ChatSummary>, ApplicationError> {
        let now = local_naive(self.deps.clock.now());
        let chats = self.deps.chats.list_visible_for(user).await?;
        let mut summaries = Vec::with_capacity(chats.len());
        for chat in chats {
            let other_id = chat.other_user(user)?;
            let Some(other) = self.deps.users.find_by_id(other_id).await? else {
                continue;
            };
            let side = chat
                .side_of(user)
                .ok_or_else(|| DomainError::forbidden("list chat"))?;
            let since = chat.exit_date(side);
            let last = self.deps.messages.last_message(chat.id, since).await?;
            let unviewed = self
                .deps
                .messages
                .amount_of_unviewed(chat.id, user, since)
                .await?;

            let friend = self.deps.friends.are_friends(user, other_id).await?;
            let is_online = self.deps.online.is_online(&other).await?;
            let online_class =
                resolve_online(other.visibility.online, friend, is_online).as_class();
            let photo = if resolve_attribute(other.visibility.photo, friend) {
                other.photo.clone()
            } else {
                None
            };

            summaries.push((
                last.as_ref().map(|m| m.date),
                ChatSummary {
                    chat_id: chat.id,
                    other_user_name: other.display_name().to_string(),
                    other_user_slug: other.slug.clone(),
                    other_user_photo: photo,
                    online_class: online_class.to_string(),
                    last_preview: last.as_ref().map(|m| preview_text(&m.body)),
                    last_date: last
                        .as_ref()
                        .map(|m| format_message_date(local_naive(m.date), now)),
                    unviewed_count: unviewed,
                },
            ));
        }
        summaries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(summaries.into_iter().map(|(_, s)| s).collect())
    }

    /// 历史分页，最新在前。首个未读会被拉到返回的第一页上：若其
    /// 位置超过配置页大小，本次请求的页大小放大为 位置 + 2。
    /// 第 1 页请求顺带把他人消息标记已读（在计算未读位置之后）。
    pub async fn get_messages(
        &self,
        request: GetMessagesRequest,
    ) -> Result<MessagePage, ApplicationError> {
        if request.page == 0 {
            return Err(
                DomainError::invalid_input("page", "pagination starts at page 1").into(),
            );
        }
        let chat = self.chat_for_participant(request.chat_id, request.requester).await?;
        let side = chat
            .side_of(request.requester)
            .ok_or_else(|| DomainError::forbidden("read chat history"))?;
        let since = chat.exit_date(side);

        let stored = self.deps.messages.messages(chat.id, since).await?;
        let first_unviewed = self
            .deps
            .messages
            .first_unviewed_message_id(chat.id, request.requester)
            .await?;

        let mut effective = self.deps.messages_per_page;
        if let Some(target) = first_unviewed {
            if let Some(position) = stored.iter().position(|m| m.message.id == target) {
                if position as u32 >= effective {
                    effective = position as u32 + 2;
                }
            }
        }

        if request.page == 1 {
            self.deps
                .messages
                .mark_visualized(chat.id, request.requester)
                .await?;
        }

        let start = ((request.page - 1) * effective) as usize;
        let end = usize::min(start.saturating_add(effective as usize), stored.len());
        let slice = if start < stored.len() {
            &stored[start..end]
        } else {
            &[]
        };

        let today = local_naive(self.deps.clock.now()).date();
        let mut rendered = Vec::with_capacity(slice.len());
        let mut previous_day = None;
        for item in slice {
            let day = local_naive(item.message.date).date();
            let separator = if previous_day != Some(day) {
                Some(message_separator(day, today))
            } else {
                None
            };
            previous_day = Some(day);
            rendered.push(
                self.rendered_message(&item.message, request.requester, separator)
                    .await?,
            );
        }

        Ok(MessagePage {
            page: request.page,
            effective_page_size: effective,
            has_more: end < stored.len(),
            messages: rendered,
        })
    }

    /// 发消息：先落库再扇出。接收方此刻在会话内则直接标记已读。
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<MessageId, ApplicationError> {
        let mut chat = self.chat_for_participant(request.chat_id, request.author).await?;
        let author = self
            .deps
            .users
            .find_by_id(request.author)
            .await?
            .ok_or_else(|| DomainError::not_found("user", request.author))?;

        // 音频/视频没有内容载体，降级为固定文案的文本消息
        let body = match request.kind {
            MessageKind::Text => {
                MessageBody::text(request.content.unwrap_or_default())?
            }
            MessageKind::Image => {
                MessageBody::image(request.content.unwrap_or_default())?
            }
            MessageKind::Audio => MessageBody::text("Áudio")?,
            MessageKind::Video => MessageBody::text("Vídeo")?,
        };

        let other_id = chat.other_user(request.author)?;
        let visualized = self.deps.presence.is_present(other_id, chat.id).await?;
        let message = Message::new(
            MessageId::generate(),
            request.author,
            body,
            self.deps.clock.now(),
        );
        let message_id = message.id;
        self.deps
            .messages
            .create_in_chat(chat.id, message.clone(), visualized)
            .await?;

        // 对方此前把会话从列表移除的话，这条消息把它带回来
        let participants = [chat.user1, chat.user2];
        let pre_flip: Vec<bool> = participants
            .iter()
            .map(|&p| chat.side_of(p).map(|s| chat.view_flag(s)).unwrap_or(false))
            .collect();
        let other_side = chat
            .side_of(other_id)
            .ok_or_else(|| DomainError::forbidden("resolve chat side"))?;
        if !chat.view_flag(other_side) {
            chat.set_view_flag(other_side, true);
            chat = self.deps.chats.update(chat).await?;
            tracing::debug!(chat_id = %chat.id, user_id = %other_id, "会话回到对方列表");
        }

        for (index, &participant) in participants.iter().enumerate() {
            let side = chat
                .side_of(participant)
                .ok_or_else(|| DomainError::forbidden("resolve chat side"))?;
            let since = chat.exit_date(side);
            let unviewed = self
                .deps
                .messages
                .amount_of_unviewed(chat.id, participant, since)
                .await?;
            self.deps
                .bus
                .publish(
                    Channel::Inbox { user: participant },
                    FanoutEvent::InboxMessage(InboxMessageEvent {
                        chat_id: chat.id,
                        message_id,
                        author_name: author.display_name().to_string(),
                        kind: message.kind(),
                        unviewed_count: unviewed,
                        date: message.date,
                        new_chat: !pre_flip[index],
                    }),
                )
                .await;
        }

        for &participant in &participants {
            self.deps
                .bus
                .publish(
                    Channel::Chat {
                        user: participant,
                        chat: chat.id,
                    },
                    FanoutEvent::ChatMessage(ChatMessageEvent {
                        chat_id: chat.id,
                        message_id,
                        kind: message.kind(),
                        is_author: participant == request.author,
                    }),
                )
                .await;
        }

        let unviewed_any = self.deps.messages.has_unviewed(chat.id).await?;
        for &participant in &participants {
            let side = chat
                .side_of(participant)
                .ok_or_else(|| DomainError::forbidden("resolve chat side"))?;
            if chat.view_flag(side) {
                self.deps
                    .bus
                    .publish(
                        Channel::Navbar { user: participant },
                        FanoutEvent::NavbarChatUnviewed {
                            value: unviewed_any,
                        },
                    )
                    .await;
            }
        }

        Ok(message_id)
    }

    /// 他人发出的未读全部置已读，幂等。
    pub async fn mark_visualized(
        &self,
        chat_id: ChatId,
        viewer: UserId,
    ) -> Result<u64, ApplicationError> {
        let chat = self.chat_for_participant(chat_id, viewer).await?;
        Ok(self.deps.messages.mark_visualized(chat.id, viewer).await?)
    }

    /// 把会话从请求者列表移除。双方都移除后整个会话连同消息删除。
    pub async fn remove_chat(
        &self,
        chat_id: ChatId,
        requester: UserId,
    ) -> Result<(), ApplicationError> {
        let mut chat = self.chat_for_participant(chat_id, requester).await?;
        chat.leave(requester, self.deps.clock.now())?;
        if chat.is_orphaned() {
            self.deps.chats.delete(chat.id).await?;
            tracing::info!(chat_id = %chat_id, "双方均已退出，会话删除");
        } else {
            self.deps.chats.update(chat).await?;
        }
        Ok(())
    }

    /// 单会话频道的出站帧。接收路径要先解析作者的在线可见性。
    pub async fn chat_frame(
        &self,
        viewer: UserId,
        event: &ChatMessageEvent,
    ) -> Result<ChatSessionFrame, ApplicationError> {
        let message = self
            .deps
            .messages
            .find_message(event.message_id)
            .await?
            .ok_or_else(|| DomainError::not_found("message", event.message_id))?;
        let rendered = self.render_message_content(&message, viewer).await?;
        Ok(ChatSessionFrame {
            chat_id: event.chat_id,
            message_id: message.id,
            message_type: message.kind(),
            is_author: event.is_author,
            rendered_content: rendered,
        })
    }

    /// 会话列表频道的出站帧。create 额外渲染整行。
    pub async fn inbox_frame(
        &self,
        viewer: UserId,
        event: &InboxMessageEvent,
    ) -> Result<ChatListFrame, ApplicationError> {
        let now = local_naive(self.deps.clock.now());
        let message = self
            .deps
            .messages
            .find_message(event.message_id)
            .await?
            .ok_or_else(|| DomainError::not_found("message", event.message_id))?;
        let preview = preview_text(&message.body);
        let date = format_message_date(local_naive(event.date), now);

        let rendered_row = if event.new_chat {
            let chat = self
                .deps
                .chats
                .find_by_id(event.chat_id)
                .await?
                .ok_or_else(|| DomainError::not_found("chat", event.chat_id))?;
            let other_id = chat.other_user(viewer)?;
            let other = self
                .deps
                .users
                .find_by_id(other_id)
                .await?
                .ok_or_else(|| DomainError::not_found("user", other_id))?;
            let friend = self.deps.friends.are_friends(viewer, other_id).await?;
            let is_online = self.deps.online.is_online(&other).await?;
            let online_class =
                resolve_online(other.visibility.online, friend, is_online).as_class();
            let photo = if resolve_attribute(other.visibility.photo, friend) {
                other.photo.clone()
            } else {
                None
            };
            Some(self.deps.renderer.render(
                "chat_list_row",
                &json!({
                    "chat_id": chat.id,
                    "name": other.display_name(),
                    "photo": photo,
                    "online_class": online_class,
                    "preview": preview,
                    "date": date,
                    "unviewed_count": event.unviewed_count,
                }),
            ))
        } else {
            None
        };

        Ok(ChatListFrame {
            action: if event.new_chat { "create" } else { "update" }.to_string(),
            chat_id: event.chat_id,
            author_name: event.author_name.clone(),
            preview,
            unviewed_count: event.unviewed_count,
            date,
            rendered_row,
        })
    }

    /// 导航栏连接时的初始未读标志：任一可见会话里有未读即为 true。
    pub async fn unviewed_flag(&self, user: UserId) -> Result<bool, ApplicationError> {
        for chat in self.deps.chats.list_visible_for(user).await? {
            if self.deps.messages.has_unviewed(chat.id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 单会话连接握手前的准入检查：会话存在且请求者是参与者。
    pub async fn authorize_session(
        &self,
        chat_id: ChatId,
        user: UserId,
    ) -> Result<(), ApplicationError> {
        self.chat_for_participant(chat_id, user).await.map(|_| ())
    }

    async fn chat_for_participant(
        &self,
        chat_id: ChatId,
        user: UserId,
    ) -> Result<Chat, ApplicationError> {
        let chat = self
            .deps
            .chats
            .find_by_id(chat_id)
            .await?
            .ok_or_else(|| DomainError::not_found("chat", chat_id))?;
        if !chat.is_participant(user) {
            return Err(DomainError::forbidden("act on chat").into());
        }
        Ok(chat)
    }

    async fn rendered_message(
        &self,
        message: &Message,
        viewer: UserId,
        separator: Option<String>,
    ) -> Result<RenderedMessage, ApplicationError> {
        let rendered = self.render_message_content(message, viewer).await?;
        Ok(RenderedMessage {
            message_id: message.id,
            message_type: message.kind(),
            is_author: message.is_author(viewer),
            rendered_content: rendered,
            date: message.date,
            separator,
        })
    }

    /// 发送方和接收方走不同模板；音频/视频没有渲染器，内容为 None。
    async fn render_message_content(
        &self,
        message: &Message,
        viewer: UserId,
    ) -> Result<Option<String>, ApplicationError> {
        let (text, image) = match &message.body {
            MessageBody::Text { text } => (Some(text.as_str()), None),
            MessageBody::Image { image } => (None, Some(image.as_str())),
            MessageBody::Audio | MessageBody::Video => return Ok(None),
        };
        if message.is_author(viewer) {
            return Ok(Some(self.deps.renderer.render(
                "message_sent",
                &json!({ "text": text, "image": image }),
            )));
        }
        let author = self
            .deps
            .users
            .find_by_id(message.author)
            .await?
            .ok_or_else(|| DomainError::not_found("user", message.author))?;
        let friend = self.deps.friends.are_friends(viewer, message.author).await?;
        let is_online = self.deps.online.is_online(&author).await?;
        let online_class = resolve_online(author.visibility.online, friend, is_online).as_class();
        Ok(Some(self.deps.renderer.render(
            "message_received",
            &json!({
                "text": text,
                "image": image,
                "author": author.display_name(),
                "online_class": online_class,
            }),
        )))
    }
}

//! 通知用例：好友请求的生命周期与通知面板的帧构建。

use std::sync::Arc;

use serde_json::json;

use crate::clock::Clock;
use crate::dto::{NotificationCreateFrame, NotificationDto, NotificationUpdateFrame};
use crate::error::ApplicationError;
use crate::fanout::{Channel, EventBus, FanoutEvent, NotificationEvent};
use crate::render::Renderer;
use domain::{
    Chat, ChatId, ChatRepository, DomainError, Notification, NotificationId, NotificationKindTag,
    NotificationRepository, User, UserId, UserRepository,
};

pub struct NotificationServiceDependencies {
    pub users: Arc<dyn UserRepository>,
    pub chats: Arc<dyn ChatRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub bus: Arc<dyn EventBus>,
    pub renderer: Arc<dyn Renderer>,
    pub clock: Arc<dyn Clock>,
}

pub struct ReplyRequest {
    pub notification_id: NotificationId,
    pub tag: NotificationKindTag,
    pub requester: UserId,
    pub accept: bool,
}

/// 通知面板的初始数据：发出的与收到的两列。
#[derive(Debug, Clone, serde::Serialize)]
pub struct NotificationPanel {
    pub sent: Vec<NotificationDto>,
    pub received: Vec<NotificationDto>,
}

pub struct NotificationService {
    deps: NotificationServiceDependencies,
}

impl NotificationService {
    pub fn new(deps: NotificationServiceDependencies) -> Self {
        Self { deps }
    }

    /// 发起好友请求。目标按 email 或 slug 查找；自引用、已是好友、
    /// 重复待处理请求都在写入前拒绝。
    pub async fn send_friend_request(
        &self,
        author: UserId,
        target_query: &str,
    ) -> Result<Notification, ApplicationError> {
        let target = self.find_target(target_query).await?;
        if target.id == author {
            return Err(DomainError::SelfReference.into());
        }
        if self.deps.users.are_friends(author, target.id).await? {
            return Err(DomainError::AlreadyFriends.into());
        }
        if self
            .deps
            .notifications
            .pending_friendship_exists(author, target.id)
            .await?
        {
            return Err(DomainError::DuplicateRequest.into());
        }

        let notification = Notification::friendship_request(
            NotificationId::generate(),
            author,
            target.id,
            crate::dto::local_naive(self.deps.clock.now()).date(),
        )?;
        let notification = self.deps.notifications.create(notification).await?;
        tracing::info!(
            notification_id = %notification.id,
            author_id = %author,
            receiver_id = %target.id,
            "好友请求已创建"
        );

        self.publish_created(&notification).await;
        self.publish_pending_flag(notification.receiver).await?;
        Ok(notification)
    }

    /// 回应好友请求。接受时建立双向好友关系，并保证两人之间恰有
    /// 一个会话（已存在则不再创建，任一顺序算存在）。
    pub async fn reply(&self, request: ReplyRequest) -> Result<Notification, ApplicationError> {
        let mut notification = self
            .deps
            .notifications
            .find(request.notification_id, request.tag)
            .await?
            .ok_or_else(|| DomainError::not_found("notification", request.notification_id))?;
        if !notification.is_receiver(request.requester) {
            return Err(DomainError::forbidden("reply to notification").into());
        }

        if request.accept {
            notification.accept();
            self.deps
                .users
                .add_friendship(notification.author, notification.receiver)
                .await?;
            notification.receiver_view = false;
            if request.tag == NotificationKindTag::Friendship {
                self.ensure_chat(notification.author, notification.receiver)
                    .await?;
            }
        } else {
            notification.reject();
        }

        let notification = if notification.should_be_deleted() {
            self.deps.notifications.delete(notification.id).await?;
            notification
        } else {
            self.deps.notifications.update(notification).await?
        };
        tracing::info!(
            notification_id = %notification.id,
            accepted = request.accept,
            "好友请求已回应"
        );

        self.publish_changed(&notification).await;
        self.publish_pending_flag(notification.receiver).await?;
        Ok(notification)
    }

    /// 清掉请求者名下所有已完结通知的可见性。两侧都不可见的通知
    /// 随之删除。
    pub async fn remove_visibility(
        &self,
        requester: UserId,
        tag: NotificationKindTag,
    ) -> Result<(), ApplicationError> {
        let authored = self
            .deps
            .notifications
            .list_finished_authored(requester, tag)
            .await?;
        for mut notification in authored {
            notification.author_view = false;
            self.apply_visibility_change(notification).await?;
        }

        let received = self
            .deps
            .notifications
            .list_finished_received(requester, tag)
            .await?;
        for mut notification in received {
            notification.receiver_view = false;
            self.apply_visibility_change(notification).await?;
        }
        Ok(())
    }

    pub async fn panel(
        &self,
        user: UserId,
        tag: NotificationKindTag,
    ) -> Result<NotificationPanel, ApplicationError> {
        let sent = self.deps.notifications.list_sent(user, tag).await?;
        let received = self.deps.notifications.list_received(user, tag).await?;
        Ok(NotificationPanel {
            sent: sent.iter().map(NotificationDto::from_entity).collect(),
            received: received.iter().map(NotificationDto::from_entity).collect(),
        })
    }

    /// create 帧：按观看者是作者还是接收者选模板。
    pub async fn create_frame(
        &self,
        viewer: UserId,
        event: &NotificationEvent,
    ) -> Result<NotificationCreateFrame, ApplicationError> {
        let notification = self
            .deps
            .notifications
            .find(event.notification_id, event.tag)
            .await?
            .ok_or_else(|| DomainError::not_found("notification", event.notification_id))?;
        let is_author = notification.is_author(viewer);
        let other_id = if is_author {
            notification.receiver
        } else {
            notification.author
        };
        let other = self
            .deps
            .users
            .find_by_id(other_id)
            .await?
            .ok_or_else(|| DomainError::not_found("user", other_id))?;
        let template = if is_author {
            "notification_sent"
        } else {
            "notification_received"
        };
        let rendered = self.deps.renderer.render(
            template,
            &json!({
                "id": notification.id,
                "other": other.display_name(),
                "status_display": notification.status.display(),
                "date": notification.date.format("%d/%m/%Y").to_string(),
            }),
        );
        Ok(NotificationCreateFrame {
            notification: NotificationDto::from_entity(&notification),
            tag: event.tag,
            is_author,
            rendered,
        })
    }

    /// update 帧只投递给作者本人；观看者不是作者、或通知已被删除
    /// 时返回 None。
    pub async fn update_frame(
        &self,
        viewer: UserId,
        event: &NotificationEvent,
    ) -> Result<Option<NotificationUpdateFrame>, ApplicationError> {
        let Some(notification) = self
            .deps
            .notifications
            .find(event.notification_id, event.tag)
            .await?
        else {
            return Ok(None);
        };
        if !notification.is_author(viewer) {
            return Ok(None);
        }
        Ok(Some(NotificationUpdateFrame {
            id: notification.id,
            tag: event.tag,
            group_id: notification.group_id(),
            status_display: notification.status.display().to_string(),
            is_finished: notification.is_finished(),
        }))
    }

    /// 导航栏连接时的初始待处理标志。
    pub async fn pending_flag(&self, user: UserId) -> Result<bool, ApplicationError> {
        Ok(self.deps.notifications.has_pending_for(user).await?)
    }

    async fn find_target(&self, query: &str) -> Result<User, ApplicationError> {
        if let Some(user) = self.deps.users.find_by_email(query).await? {
            return Ok(user);
        }
        Ok(self
            .deps
            .users
            .find_by_slug(query)
            .await?
            .ok_or_else(|| DomainError::not_found("user", query))?)
    }

    async fn apply_visibility_change(
        &self,
        notification: Notification,
    ) -> Result<(), ApplicationError> {
        if notification.should_be_deleted() {
            self.deps.notifications.delete(notification.id).await?;
        } else {
            let notification = self.deps.notifications.update(notification).await?;
            self.publish_changed(&notification).await;
        }
        Ok(())
    }

    async fn ensure_chat(&self, a: UserId, b: UserId) -> Result<(), ApplicationError> {
        if self.deps.chats.find_between(a, b).await?.is_none() {
            let chat = Chat::new(ChatId::generate(), a, b)?;
            self.deps.chats.create(chat).await?;
        }
        Ok(())
    }

    async fn publish_created(&self, notification: &Notification) {
        let event = NotificationEvent {
            notification_id: notification.id,
            tag: notification.kind_tag(),
        };
        for user in [notification.author, notification.receiver] {
            self.deps
                .bus
                .publish(
                    Channel::Notifications { user },
                    FanoutEvent::NotificationCreated(event.clone()),
                )
                .await;
        }
    }

    /// 状态/可见性变更：双方频道都发 update 和 create，连接层按
    /// 观看者身份决定投递哪一个。
    async fn publish_changed(&self, notification: &Notification) {
        let event = NotificationEvent {
            notification_id: notification.id,
            tag: notification.kind_tag(),
        };
        for user in [notification.author, notification.receiver] {
            self.deps
                .bus
                .publish(
                    Channel::Notifications { user },
                    FanoutEvent::NotificationUpdated(event.clone()),
                )
                .await;
        }
    }

    async fn publish_pending_flag(&self, receiver: UserId) -> Result<(), ApplicationError> {
        let value = self.deps.notifications.has_pending_for(receiver).await?;
        self.deps
            .bus
            .publish(
                Channel::Navbar { user: receiver },
                FanoutEvent::NavbarPendingNotifications { value },
            )
            .await;
        Ok(())
    }
}

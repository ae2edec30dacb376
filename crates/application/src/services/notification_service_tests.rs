use std::sync::Arc;

use crate::clock::SystemClock;
use crate::fanout::{Channel, EventBus, FanoutEvent, LocalEventBus};
use crate::memory::MemoryStore;
use crate::render::testing::EchoRenderer;
use crate::services::{
    NotificationService, NotificationServiceDependencies, ReplyRequest,
};
use crate::ApplicationError;
use domain::{
    Chat, ChatId, ChatRepository, DomainError, NotificationKindTag, NotificationRepository,
    NotificationStatus, User, UserId, UserRepository,
};

struct Harness {
    service: NotificationService,
    store: Arc<MemoryStore>,
    bus: Arc<LocalEventBus>,
}

fn harness() -> Harness {
    let store = MemoryStore::new();
    let bus = Arc::new(LocalEventBus::new(64));
    let service = NotificationService::new(NotificationServiceDependencies {
        users: store.clone(),
        chats: store.clone(),
        notifications: store.clone(),
        bus: bus.clone(),
        renderer: Arc::new(EchoRenderer),
        clock: Arc::new(SystemClock),
    });
    Harness {
        service,
        store,
        bus,
    }
}

async fn two_users(store: &MemoryStore) -> (User, User) {
    let a = store
        .seed_user(User::new(UserId::generate(), "ana", "ana@example.com"))
        .await;
    let b = store
        .seed_user(User::new(UserId::generate(), "beto", "beto@example.com"))
        .await;
    (a, b)
}

#[tokio::test]
async fn friend_request_fans_out_to_both_parties() {
    let h = harness();
    let (a, b) = two_users(&h.store).await;

    let mut author_panel = h.bus.subscribe(Channel::Notifications { user: a.id });
    let mut receiver_panel = h.bus.subscribe(Channel::Notifications { user: b.id });
    let mut receiver_navbar = h.bus.subscribe(Channel::Navbar { user: b.id });

    let notification = h.service.send_friend_request(a.id, "beto").await.unwrap();
    assert_eq!(notification.status, NotificationStatus::Pending);

    for stream in [&mut author_panel, &mut receiver_panel] {
        match stream.try_recv() {
            Some(FanoutEvent::NotificationCreated(ev)) => {
                assert_eq!(ev.notification_id, notification.id);
                assert_eq!(ev.tag, NotificationKindTag::Friendship);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(matches!(
        receiver_navbar.try_recv(),
        Some(FanoutEvent::NavbarPendingNotifications { value: true })
    ));

    // create 帧按观看者身份选模板
    let event = crate::fanout::NotificationEvent {
        notification_id: notification.id,
        tag: NotificationKindTag::Friendship,
    };
    let sent = h.service.create_frame(a.id, &event).await.unwrap();
    assert!(sent.is_author);
    assert!(sent.rendered.contains("notification_sent"));
    let received = h.service.create_frame(b.id, &event).await.unwrap();
    assert!(!received.is_author);
    assert!(received.rendered.contains("notification_received"));
}

#[tokio::test]
async fn friend_request_target_resolves_by_email_or_slug() {
    let h = harness();
    let (a, b) = two_users(&h.store).await;

    let by_email = h
        .service
        .send_friend_request(a.id, "beto@example.com")
        .await
        .unwrap();
    assert_eq!(by_email.receiver, b.id);

    // 同一对用户的重复请求照常被拒，不论用哪种标识
    assert!(matches!(
        h.service.send_friend_request(a.id, "beto").await,
        Err(ApplicationError::Domain(DomainError::DuplicateRequest))
    ));

    assert!(matches!(
        h.service.send_friend_request(a.id, "ninguem").await,
        Err(ApplicationError::Domain(DomainError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn self_request_is_rejected() {
    let h = harness();
    let (a, _) = two_users(&h.store).await;
    assert!(matches!(
        h.service.send_friend_request(a.id, "ana").await,
        Err(ApplicationError::Domain(DomainError::SelfReference))
    ));
}

#[tokio::test]
async fn request_between_friends_is_rejected() {
    let h = harness();
    let (a, b) = two_users(&h.store).await;
    h.store.add_friendship(a.id, b.id).await.unwrap();
    assert!(matches!(
        h.service.send_friend_request(a.id, "beto").await,
        Err(ApplicationError::Domain(DomainError::AlreadyFriends))
    ));
}

#[tokio::test]
async fn duplicate_pending_request_is_rejected() {
    let h = harness();
    let (a, _) = two_users(&h.store).await;
    h.service.send_friend_request(a.id, "beto").await.unwrap();
    assert!(matches!(
        h.service.send_friend_request(a.id, "beto").await,
        Err(ApplicationError::Domain(DomainError::DuplicateRequest))
    ));
}

#[tokio::test]
async fn accept_establishes_friendship_and_exactly_one_chat() {
    let h = harness();
    let (a, b) = two_users(&h.store).await;
    let notification = h.service.send_friend_request(a.id, "beto").await.unwrap();

    let replied = h
        .service
        .reply(ReplyRequest {
            notification_id: notification.id,
            tag: NotificationKindTag::Friendship,
            requester: b.id,
            accept: true,
        })
        .await
        .unwrap();

    assert_eq!(replied.status, NotificationStatus::Accepted);
    assert!(!replied.receiver_view);
    assert!(replied.author_view);
    assert!(h.store.are_friends(b.id, a.id).await.unwrap());
    assert!(h.store.find_between(b.id, a.id).await.unwrap().is_some());
}

#[tokio::test]
async fn accept_with_existing_chat_creates_none() {
    let h = harness();
    let (a, b) = two_users(&h.store).await;
    // 反向存的会话也算存在
    let existing = ChatRepository::create(
        h.store.as_ref(),
        Chat::new(ChatId::generate(), b.id, a.id).unwrap(),
    )
    .await
    .unwrap();

    let notification = h.service.send_friend_request(a.id, "beto").await.unwrap();
    h.service
        .reply(ReplyRequest {
            notification_id: notification.id,
            tag: NotificationKindTag::Friendship,
            requester: b.id,
            accept: true,
        })
        .await
        .unwrap();

    let found = h.store.find_between(a.id, b.id).await.unwrap().unwrap();
    assert_eq!(found.id, existing.id);
}

#[tokio::test]
async fn reject_changes_status_only() {
    let h = harness();
    let (a, b) = two_users(&h.store).await;
    let notification = h.service.send_friend_request(a.id, "beto").await.unwrap();

    let mut author_panel = h.bus.subscribe(Channel::Notifications { user: a.id });
    let replied = h
        .service
        .reply(ReplyRequest {
            notification_id: notification.id,
            tag: NotificationKindTag::Friendship,
            requester: b.id,
            accept: false,
        })
        .await
        .unwrap();

    assert_eq!(replied.status, NotificationStatus::Rejected);
    assert!(!h.store.are_friends(a.id, b.id).await.unwrap());
    assert!(h.store.find_between(a.id, b.id).await.unwrap().is_none());

    match author_panel.try_recv() {
        Some(FanoutEvent::NotificationUpdated(ev)) => {
            let frame = h.service.update_frame(a.id, &ev).await.unwrap().unwrap();
            assert_eq!(frame.status_display, "Recusado");
            assert!(frame.is_finished);
            assert_eq!(frame.group_id, None);

            // 非作者拿不到 update 帧
            assert!(h.service.update_frame(b.id, &ev).await.unwrap().is_none());
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn only_receiver_may_reply() {
    let h = harness();
    let (a, _) = two_users(&h.store).await;
    let notification = h.service.send_friend_request(a.id, "beto").await.unwrap();

    assert!(matches!(
        h.service
            .reply(ReplyRequest {
                notification_id: notification.id,
                tag: NotificationKindTag::Friendship,
                requester: a.id,
                accept: true,
            })
            .await,
        Err(ApplicationError::Domain(DomainError::Forbidden { .. }))
    ));
}

#[tokio::test]
async fn unknown_notification_is_not_found() {
    let h = harness();
    let (a, _) = two_users(&h.store).await;
    assert!(matches!(
        h.service
            .reply(ReplyRequest {
                notification_id: domain::NotificationId::generate(),
                tag: NotificationKindTag::Friendship,
                requester: a.id,
                accept: true,
            })
            .await,
        Err(ApplicationError::Domain(DomainError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn visibility_removal_deletes_when_both_sides_cleared() {
    let h = harness();
    let (a, b) = two_users(&h.store).await;
    let notification = h.service.send_friend_request(a.id, "beto").await.unwrap();
    h.service
        .reply(ReplyRequest {
            notification_id: notification.id,
            tag: NotificationKindTag::Friendship,
            requester: b.id,
            accept: true,
        })
        .await
        .unwrap();

    // 接受后 receiver_view 已为 false，作者清掉自己的一侧后删除
    h.service
        .remove_visibility(a.id, NotificationKindTag::Friendship)
        .await
        .unwrap();
    assert!(h
        .store
        .find(notification.id, NotificationKindTag::Friendship)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn pending_requests_are_untouched_by_visibility_removal() {
    let h = harness();
    let (a, _) = two_users(&h.store).await;
    let notification = h.service.send_friend_request(a.id, "beto").await.unwrap();

    h.service
        .remove_visibility(a.id, NotificationKindTag::Friendship)
        .await
        .unwrap();
    assert!(h
        .store
        .find(notification.id, NotificationKindTag::Friendship)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn panel_splits_sent_and_received() {
    let h = harness();
    let (a, b) = two_users(&h.store).await;
    let notification = h.service.send_friend_request(a.id, "beto").await.unwrap();

    let author_panel = h
        .service
        .panel(a.id, NotificationKindTag::Friendship)
        .await
        .unwrap();
    assert_eq!(author_panel.sent.len(), 1);
    assert_eq!(author_panel.sent[0].id, notification.id);
    assert!(author_panel.received.is_empty());

    let receiver_panel = h
        .service
        .panel(b.id, NotificationKindTag::Friendship)
        .await
        .unwrap();
    assert!(receiver_panel.sent.is_empty());
    assert_eq!(receiver_panel.received.len(), 1);
}

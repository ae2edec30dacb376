use std::sync::{Arc, Mutex};

use chrono::{Duration, TimeZone, Utc};

use crate::clock::Clock;
use crate::fanout::{Channel, EventBus, FanoutEvent, LocalEventBus};
use crate::memory::MemoryStore;
use crate::presence::{MemoryPresenceTracker, OnlineStatus, PresenceTracker};
use crate::render::testing::EchoRenderer;
use crate::services::{
    ChatService, ChatServiceDependencies, FriendLookup, GetMessagesRequest, SendMessageRequest,
};
use domain::{
    Chat, ChatId, ChatRepository, DomainError, MessageKind, MessageRepository, Timestamp, User,
    UserId,
};

/// 每次读取前进一秒的确定性时钟。
struct StepClock {
    current: Mutex<Timestamp>,
}

impl StepClock {
    fn new() -> Self {
        Self {
            current: Mutex::new(Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()),
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> Timestamp {
        let mut current = self.current.lock().unwrap();
        *current += Duration::seconds(1);
        *current
    }
}

struct Harness {
    service: ChatService,
    store: Arc<MemoryStore>,
    bus: Arc<LocalEventBus>,
    presence: Arc<MemoryPresenceTracker>,
}

fn harness(messages_per_page: u32) -> Harness {
    let store = MemoryStore::new();
    let bus = Arc::new(LocalEventBus::new(64));
    let presence = Arc::new(MemoryPresenceTracker::new());
    let service = ChatService::new(ChatServiceDependencies {
        users: store.clone(),
        chats: store.clone(),
        messages: store.clone(),
        presence: presence.clone(),
        online: OnlineStatus::new(store.clone(), store.clone()),
        friends: FriendLookup::new(store.clone()),
        bus: bus.clone(),
        renderer: Arc::new(EchoRenderer),
        clock: Arc::new(StepClock::new()),
        messages_per_page,
    });
    Harness {
        service,
        store,
        bus,
        presence,
    }
}

async fn seeded_chat(store: &MemoryStore) -> (User, User, Chat) {
    let a = store
        .seed_user(User::new(UserId::generate(), "ana", "ana@example.com"))
        .await;
    let b = store
        .seed_user(User::new(UserId::generate(), "beto", "beto@example.com"))
        .await;
    let chat = ChatRepository::create(store, Chat::new(ChatId::generate(), a.id, b.id).unwrap())
        .await
        .unwrap();
    (a, b, chat)
}

fn text_message(chat: &Chat, author: UserId, text: &str) -> SendMessageRequest {
    SendMessageRequest {
        chat_id: chat.id,
        author,
        kind: MessageKind::Text,
        content: Some(text.to_string()),
    }
}

#[tokio::test]
async fn recipient_presence_premarks_visualized() {
    let h = harness(10);
    let (a, b, chat) = seeded_chat(&h.store).await;

    h.presence.mark_entered(b.id, chat.id).await.unwrap();
    h.service
        .send_message(text_message(&chat, a.id, "oi"))
        .await
        .unwrap();
    assert_eq!(
        h.store.amount_of_unviewed(chat.id, b.id, None).await.unwrap(),
        0
    );

    h.presence.mark_exited(b.id, chat.id).await.unwrap();
    h.service
        .send_message(text_message(&chat, a.id, "oi de novo"))
        .await
        .unwrap();
    assert_eq!(
        h.store.amount_of_unviewed(chat.id, b.id, None).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn outsider_cannot_send_and_nothing_is_written() {
    let h = harness(10);
    let (_, _, chat) = seeded_chat(&h.store).await;
    let intruder = h
        .store
        .seed_user(User::new(UserId::generate(), "caio", "caio@example.com"))
        .await;

    let result = h
        .service
        .send_message(text_message(&chat, intruder.id, "invasor"))
        .await;
    assert!(matches!(
        result,
        Err(crate::ApplicationError::Domain(DomainError::Forbidden { .. }))
    ));
    assert_eq!(h.store.amount_of_messages(chat.id, None).await.unwrap(), 0);
}

#[tokio::test]
async fn session_authorization_rejects_outsiders_and_unknown_chats() {
    let h = harness(10);
    let (a, _, chat) = seeded_chat(&h.store).await;
    let intruder = h
        .store
        .seed_user(User::new(UserId::generate(), "caio", "caio@example.com"))
        .await;

    assert!(h.service.authorize_session(chat.id, a.id).await.is_ok());
    assert!(matches!(
        h.service.authorize_session(chat.id, intruder.id).await,
        Err(crate::ApplicationError::Domain(DomainError::Forbidden { .. }))
    ));
    assert!(matches!(
        h.service.authorize_session(ChatId::generate(), a.id).await,
        Err(crate::ApplicationError::Domain(DomainError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn empty_text_is_rejected_before_any_write() {
    let h = harness(10);
    let (a, _, chat) = seeded_chat(&h.store).await;

    let result = h
        .service
        .send_message(SendMessageRequest {
            chat_id: chat.id,
            author: a.id,
            kind: MessageKind::Text,
            content: Some(String::new()),
        })
        .await;
    assert!(matches!(
        result,
        Err(crate::ApplicationError::Domain(
            DomainError::InvalidInput { .. }
        ))
    ));
    assert_eq!(h.store.amount_of_messages(chat.id, None).await.unwrap(), 0);
}

#[tokio::test]
async fn audio_degrades_to_fixed_text() {
    let h = harness(10);
    let (a, _, chat) = seeded_chat(&h.store).await;

    let id = h
        .service
        .send_message(SendMessageRequest {
            chat_id: chat.id,
            author: a.id,
            kind: MessageKind::Audio,
            content: None,
        })
        .await
        .unwrap();

    let message = h.store.find_message(id).await.unwrap().unwrap();
    assert_eq!(message.kind(), MessageKind::Text);
    assert_eq!(crate::dto::preview_text(&message.body), "Áudio");
}

#[tokio::test]
async fn image_message_resurrects_removed_chat_and_fans_out() {
    let h = harness(10);
    let (a, b, chat) = seeded_chat(&h.store).await;

    // b 把会话从自己的列表里移除
    h.service.remove_chat(chat.id, b.id).await.unwrap();

    let mut inbox = h.bus.subscribe(Channel::Inbox { user: b.id });
    let mut navbar = h.bus.subscribe(Channel::Navbar { user: b.id });
    let mut room = h.bus.subscribe(Channel::Chat {
        user: b.id,
        chat: chat.id,
    });

    h.service
        .send_message(SendMessageRequest {
            chat_id: chat.id,
            author: a.id,
            kind: MessageKind::Image,
            content: Some("ferias.png".to_string()),
        })
        .await
        .unwrap();

    let event = match inbox.try_recv() {
        Some(FanoutEvent::InboxMessage(ev)) => ev,
        other => panic!("unexpected inbox event: {other:?}"),
    };
    assert!(event.new_chat);
    assert_eq!(event.kind, MessageKind::Image);
    assert_eq!(event.unviewed_count, 1);
    assert_eq!(event.author_name, "ana");

    // 视图标志复活并已持久化
    let stored = ChatRepository::find_by_id(h.store.as_ref(), chat.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_visible_to(b.id));

    // 标志翻回 true 之后导航栏才会收到
    assert!(matches!(
        navbar.try_recv(),
        Some(FanoutEvent::NavbarChatUnviewed { value: true })
    ));
    assert!(matches!(
        room.try_recv(),
        Some(FanoutEvent::ChatMessage(ev)) if !ev.is_author
    ));

    // 列表帧：create 动作、预览 Foto、整行渲染
    let frame = h.service.inbox_frame(b.id, &event).await.unwrap();
    assert_eq!(frame.action, "create");
    assert_eq!(frame.preview, "Foto");
    assert!(frame.rendered_row.as_deref().unwrap().contains("chat_list_row"));
}

#[tokio::test]
async fn update_frame_has_no_rendered_row() {
    let h = harness(10);
    let (a, b, chat) = seeded_chat(&h.store).await;

    let mut inbox = h.bus.subscribe(Channel::Inbox { user: b.id });
    h.service
        .send_message(text_message(&chat, a.id, "oi"))
        .await
        .unwrap();

    let event = match inbox.try_recv() {
        Some(FanoutEvent::InboxMessage(ev)) => ev,
        other => panic!("unexpected inbox event: {other:?}"),
    };
    assert!(!event.new_chat);

    let frame = h.service.inbox_frame(b.id, &event).await.unwrap();
    assert_eq!(frame.action, "update");
    assert!(frame.rendered_row.is_none());
}

#[tokio::test]
async fn first_unviewed_extends_page_size() {
    let h = harness(10);
    let (a, b, chat) = seeded_chat(&h.store).await;

    // 17 条消息，最老的一条已读，其余 16 条未读：
    // 倒序列表里第一条未读落在下标 15
    h.presence.mark_entered(a.id, chat.id).await.unwrap();
    h.service
        .send_message(text_message(&chat, b.id, "m0"))
        .await
        .unwrap();
    h.presence.mark_exited(a.id, chat.id).await.unwrap();
    for i in 1..17 {
        h.service
            .send_message(text_message(&chat, b.id, &format!("m{i}")))
            .await
            .unwrap();
    }

    let page = h
        .service
        .get_messages(GetMessagesRequest {
            chat_id: chat.id,
            requester: a.id,
            page: 1,
        })
        .await
        .unwrap();
    assert_eq!(page.effective_page_size, 17);
    assert_eq!(page.messages.len(), 17);
    assert!(!page.has_more);

    // 第 1 页请求顺带标记已读，幂等
    assert_eq!(
        h.store.amount_of_unviewed(chat.id, a.id, None).await.unwrap(),
        0
    );
    let again = h
        .service
        .get_messages(GetMessagesRequest {
            chat_id: chat.id,
            requester: a.id,
            page: 1,
        })
        .await
        .unwrap();
    assert_eq!(again.effective_page_size, 10);
    assert_eq!(again.messages.len(), 10);
    assert!(again.has_more);
}

#[tokio::test]
async fn exit_date_hides_history_predating_departure() {
    let h = harness(10);
    let (a, b, chat) = seeded_chat(&h.store).await;

    h.service
        .send_message(text_message(&chat, a.id, "antes"))
        .await
        .unwrap();
    h.service.remove_chat(chat.id, b.id).await.unwrap();
    h.service
        .send_message(text_message(&chat, a.id, "depois"))
        .await
        .unwrap();

    let page = h
        .service
        .get_messages(GetMessagesRequest {
            chat_id: chat.id,
            requester: b.id,
            page: 1,
        })
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);

    // 对方没退出，看得到全部
    let full = h
        .service
        .get_messages(GetMessagesRequest {
            chat_id: chat.id,
            requester: a.id,
            page: 1,
        })
        .await
        .unwrap();
    assert_eq!(full.messages.len(), 2);
}

#[tokio::test]
async fn chat_is_deleted_once_both_sides_leave() {
    let h = harness(10);
    let (a, b, chat) = seeded_chat(&h.store).await;
    h.service
        .send_message(text_message(&chat, a.id, "oi"))
        .await
        .unwrap();

    h.service.remove_chat(chat.id, a.id).await.unwrap();
    assert!(ChatRepository::find_by_id(h.store.as_ref(), chat.id)
        .await
        .unwrap()
        .is_some());

    h.service.remove_chat(chat.id, b.id).await.unwrap();
    // 双方视图都为 false 的会话不允许存在
    assert!(ChatRepository::find_by_id(h.store.as_ref(), chat.id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(h.store.amount_of_messages(chat.id, None).await.unwrap(), 0);
}

#[tokio::test]
async fn received_render_path_resolves_author_online_class() {
    let h = harness(10);
    let (a, b, chat) = seeded_chat(&h.store).await;
    let id = h
        .service
        .send_message(text_message(&chat, a.id, "oi"))
        .await
        .unwrap();

    let event = crate::fanout::ChatMessageEvent {
        chat_id: chat.id,
        message_id: id,
        kind: MessageKind::Text,
        is_author: false,
    };
    let frame = h.service.chat_frame(b.id, &event).await.unwrap();
    let rendered = frame.rendered_content.unwrap();
    assert!(rendered.contains("message_received"));
    // 双方不是好友，作者 online 可见性为 Anyone 且离线
    assert!(rendered.contains("offline-status"));
    // 正文字段平铺进渲染上下文，而不是嵌套对象
    assert!(rendered.contains(r#""text":"oi""#));
    assert!(!rendered.contains("\"content\""));

    let own = h
        .service
        .chat_frame(
            a.id,
            &crate::fanout::ChatMessageEvent {
                chat_id: chat.id,
                message_id: id,
                kind: MessageKind::Text,
                is_author: true,
            },
        )
        .await
        .unwrap();
    assert!(own.rendered_content.unwrap().contains("message_sent"));
}

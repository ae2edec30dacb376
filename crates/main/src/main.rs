//! 主应用程序入口
//!
//! 装配仓储、服务、事件总线和路由，启动 Axum 服务器。

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use application::{
    ChatService, ChatServiceDependencies, FriendLookup, LocalEventBus, MemoryPresenceTracker,
    NotificationService, NotificationServiceDependencies, OnlineStatus, SystemClock,
};
use config::AppConfig;
use infrastructure::db::repositories::{
    PgChatRepository, PgMessageRepository, PgNotificationRepository, PgSessionRepository,
    PgUserRepository,
};
use infrastructure::{Db, TemplateRenderer};
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    config.validate()?;

    tracing::info!(
        database = config.database.url.split('@').next_back().unwrap_or("unknown"),
        "连接数据库"
    );
    let pool = Db::create_pool(&config.database.url, config.database.max_connections).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let users: Arc<dyn domain::UserRepository> = Arc::new(PgUserRepository::new(pool.clone()));
    let chats: Arc<dyn domain::ChatRepository> = Arc::new(PgChatRepository::new(pool.clone()));
    let messages: Arc<dyn domain::MessageRepository> =
        Arc::new(PgMessageRepository::new(pool.clone()));
    let notifications: Arc<dyn domain::NotificationRepository> =
        Arc::new(PgNotificationRepository::new(pool.clone()));
    let sessions: Arc<dyn domain::SessionRepository> =
        Arc::new(PgSessionRepository::new(pool));

    let bus: Arc<dyn application::EventBus> =
        Arc::new(LocalEventBus::new(config.broadcast.capacity));
    let presence: Arc<dyn application::PresenceTracker> = Arc::new(MemoryPresenceTracker::new());
    let renderer: Arc<dyn application::Renderer> = Arc::new(TemplateRenderer::new());
    let clock: Arc<dyn application::Clock> = Arc::new(SystemClock);

    let chat_service = ChatService::new(ChatServiceDependencies {
        users: users.clone(),
        chats: chats.clone(),
        messages,
        presence: presence.clone(),
        online: OnlineStatus::new(users.clone(), sessions.clone()),
        friends: FriendLookup::new(users.clone()),
        bus: bus.clone(),
        renderer: renderer.clone(),
        clock: clock.clone(),
        messages_per_page: config.pagination.messages_per_page as u32,
    });

    let notification_service = NotificationService::new(NotificationServiceDependencies {
        users,
        chats,
        notifications,
        bus: bus.clone(),
        renderer,
        clock,
    });

    let state = AppState {
        chat_service: Arc::new(chat_service),
        notification_service: Arc::new(notification_service),
        presence,
        bus,
        sessions,
    };

    let app = router(state);
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(%address, "消息服务器已启动");
    axum::serve(listener, app).await?;

    Ok(())
}

use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use application::{GetMessagesRequest, ReplyRequest, SendMessageRequest};
use domain::{ChatId, MessageKind, NotificationId, NotificationKindTag};

use crate::auth::{authenticate_http, authenticate_ws};
use crate::error::ApiError;
use crate::state::AppState;
use crate::ws_connection::{self, SessionKind};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chats", get(list_chats))
        .route(
            "/api/chats/{chat_id}/messages",
            get(get_messages).post(post_message),
        )
        .route("/api/chats/{chat_id}/remove", post(remove_chat))
        .route("/api/notifications", get(notification_panel))
        .route("/api/notifications/reply", post(reply_notification))
        .route(
            "/api/notifications/remove-visibility",
            post(remove_notification_visibility),
        )
        .route("/api/friend-requests", post(send_friend_request))
        .route("/ws/chat/{chat_id}", get(ws_chat))
        .route("/ws/chats", get(ws_inbox))
        .route("/ws/notifications", get(ws_notifications))
        .route("/ws/navbar", get(ws_navbar))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = authenticate_http(&state, &headers).await?;
    let chats = state.chat_service.list_chats(user).await?;
    Ok(Json(json!({ "chats": chats })))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default = "default_page")]
    page: u32,
}

fn default_page() -> u32 {
    1
}

async fn get_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<application::MessagePage>, ApiError> {
    let user = authenticate_http(&state, &headers).await?;
    let page = state
        .chat_service
        .get_messages(GetMessagesRequest {
            chat_id: ChatId::new(chat_id),
            requester: user,
            page: query.page,
        })
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
struct PostMessagePayload {
    kind: String,
    content: Option<String>,
}

async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<Uuid>,
    Json(payload): Json<PostMessagePayload>,
) -> Result<StatusCode, ApiError> {
    let user = authenticate_http(&state, &headers).await?;
    let kind = MessageKind::from_code(&payload.kind)
        .map_err(|e| ApiError::from(application::ApplicationError::from(e)))?;
    state
        .chat_service
        .send_message(SendMessageRequest {
            chat_id: ChatId::new(chat_id),
            author: user,
            kind,
            content: payload.content,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user = authenticate_http(&state, &headers).await?;
    state
        .chat_service
        .remove_chat(ChatId::new(chat_id), user)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct TagQuery {
    #[serde(default = "default_tag")]
    tag: String,
}

fn default_tag() -> String {
    "A".to_string()
}

fn parse_tag(code: &str) -> Result<NotificationKindTag, ApiError> {
    NotificationKindTag::from_code(code)
        .map_err(|e| ApiError::from(application::ApplicationError::from(e)))
}

async fn notification_panel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TagQuery>,
) -> Result<Json<application::NotificationPanel>, ApiError> {
    let user = authenticate_http(&state, &headers).await?;
    let panel = state
        .notification_service
        .panel(user, parse_tag(&query.tag)?)
        .await?;
    Ok(Json(panel))
}

#[derive(Debug, Deserialize)]
struct ReplyPayload {
    notification_id: Uuid,
    #[serde(default = "default_tag")]
    tag: String,
    accept: bool,
}

async fn reply_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ReplyPayload>,
) -> Result<StatusCode, ApiError> {
    let user = authenticate_http(&state, &headers).await?;
    state
        .notification_service
        .reply(ReplyRequest {
            notification_id: NotificationId::new(payload.notification_id),
            tag: parse_tag(&payload.tag)?,
            requester: user,
            accept: payload.accept,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct RemoveVisibilityPayload {
    #[serde(default = "default_tag")]
    tag: String,
}

async fn remove_notification_visibility(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RemoveVisibilityPayload>,
) -> Result<StatusCode, ApiError> {
    let user = authenticate_http(&state, &headers).await?;
    state
        .notification_service
        .remove_visibility(user, parse_tag(&payload.tag)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct FriendRequestPayload {
    /// 目标用户的 email 或 slug。
    #[serde(alias = "slug")]
    user: String,
}

async fn send_friend_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<FriendRequestPayload>,
) -> Result<StatusCode, ApiError> {
    let user = authenticate_http(&state, &headers).await?;
    state
        .notification_service
        .send_friend_request(user, &payload.user)
        .await?;
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    session: Option<String>,
}

async fn ws_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user = authenticate_ws(&state, query.session.as_deref()).await?;
    let chat = ChatId::new(chat_id);
    // 不存在的会话或非参与者在升级前拒绝
    state.chat_service.authorize_session(chat, user).await?;
    Ok(ws.on_upgrade(move |socket| {
        ws_connection::run(socket, state, user, SessionKind::Chat { chat })
    }))
}

async fn ws_inbox(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user = authenticate_ws(&state, query.session.as_deref()).await?;
    Ok(ws.on_upgrade(move |socket| ws_connection::run(socket, state, user, SessionKind::Inbox)))
}

async fn ws_notifications(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user = authenticate_ws(&state, query.session.as_deref()).await?;
    Ok(ws.on_upgrade(move |socket| {
        ws_connection::run(socket, state, user, SessionKind::Notifications)
    }))
}

async fn ws_navbar(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user = authenticate_ws(&state, query.session.as_deref()).await?;
    Ok(ws.on_upgrade(move |socket| ws_connection::run(socket, state, user, SessionKind::Navbar)))
}

//! 连接鉴权
//!
//! 认证本身由外部会话层负责，这里只把会话键解析成用户。解析失败
//! 的请求直接拒绝，不产生任何状态。

use axum::http::HeaderMap;
use domain::UserId;

use crate::error::ApiError;
use crate::state::AppState;

/// HTTP 请求：`Authorization: Session <key>`。
pub async fn authenticate_http(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing Authorization header"))?;
    let key = header
        .strip_prefix("Session ")
        .ok_or_else(|| ApiError::unauthorized("expected 'Session <key>'"))?;
    resolve_session(state, key).await
}

/// WebSocket 升级请求：`?session=<key>` 查询参数。
pub async fn authenticate_ws(state: &AppState, session: Option<&str>) -> Result<UserId, ApiError> {
    let key = session.ok_or_else(|| ApiError::unauthorized("missing session parameter"))?;
    resolve_session(state, key).await
}

async fn resolve_session(state: &AppState, key: &str) -> Result<UserId, ApiError> {
    state
        .sessions
        .find_user(key)
        .await
        .map_err(|e| ApiError::from(application::ApplicationError::from(e)))?
        .ok_or_else(|| ApiError::unauthorized("session expired or unknown"))
}

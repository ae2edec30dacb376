//! Web API 层
//!
//! Axum 路由把 HTTP 写端点和四类 WebSocket 会话接到应用层服务上。
//! HTTP 用 Authorization 头携带会话键，WebSocket 用 `session`
//! 查询参数（浏览器 WS API 不能自定义头）。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;

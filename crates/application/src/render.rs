//! 渲染协作者接口
//!
//! 服务层只把渲染当作不透明的字符串生产：给模板键和上下文，拿回
//! 标记文本并原样嵌进出站帧，从不解析其内容。

use serde_json::Value;

/// 模板键约定：`message_sent` / `message_received` / `chat_list_row`
/// / `notification_sent` / `notification_received`。
pub trait Renderer: Send + Sync {
    fn render(&self, template_key: &str, context: &Value) -> String;
}

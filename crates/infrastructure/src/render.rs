//! 模板渲染器
//!
//! 内置一组 HTML 片段模板，`{name}` 形式的占位符用上下文里的同名
//! 字段替换。服务层只拿结果字符串，从不关心这里的细节。

use serde_json::Value;

use application::Renderer;

const TEMPLATES: &[(&str, &str)] = &[
    (
        "message_sent",
        r#"<div class="message message-sent"><p>{text}{image}</p></div>"#,
    ),
    (
        "message_received",
        r#"<div class="message message-received"><span class="{online_class}"></span><strong>{author}</strong><p>{text}{image}</p></div>"#,
    ),
    (
        "chat_list_row",
        r#"<li class="chat-row" data-chat="{chat_id}"><img src="{photo}"/><span class="{online_class}"></span><strong>{name}</strong><p>{preview}</p><time>{date}</time><span class="badge">{unviewed_count}</span></li>"#,
    ),
    (
        "notification_sent",
        r#"<li class="notification notification-sent" data-id="{id}">Pedido enviado para <strong>{other}</strong> em {date} — {status_display}</li>"#,
    ),
    (
        "notification_received",
        r#"<li class="notification notification-received" data-id="{id}"><strong>{other}</strong> quer ser seu amigo ({date}) — {status_display}</li>"#,
    ),
];

#[derive(Debug, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for TemplateRenderer {
    fn render(&self, template_key: &str, context: &Value) -> String {
        let Some((_, template)) = TEMPLATES.iter().find(|(key, _)| *key == template_key) else {
            tracing::warn!(template_key, "未知模板键，输出空片段");
            return String::new();
        };
        substitute(template, context)
    }
}

/// 占位符替换。缺失的字段替换为空串，嵌套对象整体按字符串展开。
fn substitute(template: &str, context: &Value) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };
        let name = &after[..end];
        output.push_str(&value_text(context.get(name)));
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    output
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_context_fields() {
        let renderer = TemplateRenderer::new();
        let html = renderer.render(
            "notification_received",
            &json!({
                "id": "n1",
                "other": "Ana",
                "date": "01/02/2024",
                "status_display": "Pendente",
            }),
        );
        assert!(html.contains("data-id=\"n1\""));
        assert!(html.contains("<strong>Ana</strong>"));
        assert!(html.contains("Pendente"));
    }

    #[test]
    fn received_message_renders_plain_text_not_json() {
        let renderer = TemplateRenderer::new();
        let html = renderer.render(
            "message_received",
            &json!({
                "text": "oi",
                "image": null,
                "author": "ana",
                "online_class": "online-status",
            }),
        );
        assert!(html.contains("<p>oi</p>"));
        assert!(!html.contains('{'));
    }

    #[test]
    fn missing_fields_become_empty() {
        let html = substitute("<p>{text}</p>", &json!({}));
        assert_eq!(html, "<p></p>");
    }

    #[test]
    fn unknown_template_yields_empty_string() {
        let renderer = TemplateRenderer::new();
        assert_eq!(renderer.render("no_such_template", &json!({})), "");
    }
}

use eyre::Result;
use log::info;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{NoteError, check_response, source_line};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookNote {
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub video_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Flomo,
    Lark,
}

impl Hook {
    fn name(self) -> &'static str {
        match self {
            Hook::Flomo => "Flomo",
            Hook::Lark => "Lark",
        }
    }
}

fn validate(note: &WebhookNote) -> Result<(), NoteError> {
    if note.webhook_url.is_empty() || note.content.is_empty() {
        return Err(NoteError::Invalid("Missing required fields: webhookUrl and content".to_string()));
    }
    match url::Url::parse(&note.webhook_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(NoteError::Invalid(format!("Invalid webhook URL: {}", note.webhook_url))),
    }
}

pub fn flomo_body(note: &WebhookNote) -> Value {
    json!({
        "content": format!("{}\n\n{} #BibiGPT", note.content, source_line(&note.video_url)),
    })
}

pub fn lark_body(note: &WebhookNote) -> Value {
    let mut text = String::new();
    if let Some(title) = note.title.as_deref().filter(|t| !t.trim().is_empty()) {
        text.push_str(title);
        text.push_str("\n\n");
    }
    text.push_str(&note.content);
    text.push_str("\n\n");
    text.push_str(&source_line(&note.video_url));
    json!({"msg_type": "text", "content": {"text": text}})
}

/// Lark answers 200 even for rejected messages; the verdict is in the body
fn lark_failure(json: &Value) -> Option<String> {
    let code = json
        .get("code")
        .or_else(|| json.get("StatusCode"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if code == 0 {
        return None;
    }
    let message = json
        .get("msg")
        .or_else(|| json.get("StatusMessage"))
        .and_then(Value::as_str)
        .unwrap_or("Lark webhook rejected the message");
    Some(format!("{message} (code {code})"))
}

pub async fn post(client: &reqwest::Client, hook: Hook, note: &WebhookNote) -> Result<()> {
    validate(note)?;
    let body = match hook {
        Hook::Flomo => flomo_body(note),
        Hook::Lark => lark_body(note),
    };

    let resp = client.post(&note.webhook_url).json(&body).send().await?;
    let json = check_response(resp, &format!("{} webhook failed", hook.name())).await?;

    if hook == Hook::Lark {
        if let Some(message) = lark_failure(&json) {
            return Err(NoteError::Upstream { status: 200, message }.into());
        }
    }
    info!("Posted note to {} webhook", hook.name());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note() -> WebhookNote {
        WebhookNote {
            webhook_url: "https://flomoapp.com/iwh/abc/def/".to_string(),
            title: Some("标题".to_string()),
            content: "要点".to_string(),
            video_url: "https://b23.tv/x".to_string(),
        }
    }

    #[test]
    fn test_flomo_body() {
        let body = flomo_body(&note());
        assert_eq!(body["content"], "要点\n\n原视频：https://b23.tv/x #BibiGPT");
    }

    #[test]
    fn test_lark_body() {
        let body = lark_body(&note());
        assert_eq!(body["msg_type"], "text");
        assert_eq!(body["content"]["text"], "标题\n\n要点\n\n原视频：https://b23.tv/x");

        let mut untitled = note();
        untitled.title = None;
        assert_eq!(lark_body(&untitled)["content"]["text"], "要点\n\n原视频：https://b23.tv/x");
    }

    #[test]
    fn test_lark_failure() {
        assert_eq!(lark_failure(&json!({"code": 0, "msg": "success"})), None);
        assert_eq!(lark_failure(&json!({"StatusCode": 0})), None);
        assert_eq!(
            lark_failure(&json!({"code": 19021, "msg": "sign match fail"})),
            Some("sign match fail (code 19021)".to_string())
        );
    }

    #[test]
    fn test_validate() {
        assert!(validate(&note()).is_ok());

        let mut bad = note();
        bad.webhook_url = "ftp://example.com".to_string();
        assert_eq!(validate(&bad).unwrap_err().status(), 400);

        let mut empty = note();
        empty.content.clear();
        assert!(validate(&empty).is_err());
    }
}

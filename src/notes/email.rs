use eyre::Result;
use log::info;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{NoteError, check_response, source_line};
use crate::config::EmailConfig;

const RESEND_URL: &str = "https://api.resend.com/emails";
const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";
const DEFAULT_SUBJECT: &str = "BibiGPT 视频总结";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailNote {
    #[serde(default)]
    pub to: String,
    pub subject: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub video_url: String,
}

impl EmailNote {
    fn subject(&self) -> &str {
        self.subject
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SUBJECT)
    }
}

/// Provider picked from `EMAIL_SERVICE` and its key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mailer {
    Resend { api_key: String, from: String },
    SendGrid { api_key: String, from: String },
}

impl Mailer {
    /// SMTP is recognised but not sent from here; a service without its key
    /// counts as not configured
    pub fn from_config(config: &EmailConfig) -> Result<Mailer, NoteError> {
        let service = config.service.as_deref().unwrap_or("smtp");
        match service {
            "resend" => {
                if let Some(api_key) = config.resend_api_key.clone() {
                    return Ok(Mailer::Resend {
                        api_key,
                        from: config
                            .from
                            .clone()
                            .unwrap_or_else(|| "BibiGPT <noreply@bibigpt.com>".to_string()),
                    });
                }
            }
            "sendgrid" => {
                if let Some(api_key) = config.sendgrid_api_key.clone() {
                    return Ok(Mailer::SendGrid {
                        api_key,
                        from: config.from.clone().unwrap_or_else(|| "noreply@bibigpt.com".to_string()),
                    });
                }
            }
            "smtp" if config.smtp_host.is_some() => {
                return Err(NoteError::Unsupported(
                    "SMTP sending is not supported. Please use Resend or SendGrid instead.".to_string(),
                ));
            }
            _ => {}
        }
        Err(NoteError::NotConfigured(
            "No email service configured. Please set EMAIL_SERVICE and corresponding API keys.".to_string(),
        ))
    }
}

pub fn html_body(content: &str, video_url: &str) -> String {
    let content = html_escape::encode_text(content).replace('\n', "<br>");
    let url = html_escape::encode_double_quoted_attribute(video_url);
    let url_text = html_escape::encode_text(video_url);
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="color: #333;">视频总结</h2>
  <div style="background: #f5f5f5; padding: 20px; border-radius: 8px; margin: 20px 0;">
    <pre style="white-space: pre-wrap; font-family: inherit;">{content}</pre>
  </div>
  <p style="color: #666; font-size: 14px;">
    <strong>原视频链接：</strong> <a href="{url}" style="color: #0066cc;">{url_text}</a>
  </p>
  <p style="color: #999; font-size: 12px; margin-top: 20px;">由 BibiGPT 自动生成</p>
</div>"#
    )
}

pub fn text_body(content: &str, video_url: &str) -> String {
    format!("{content}\n\n{}", source_line(video_url))
}

pub fn request_body(mailer: &Mailer, note: &EmailNote) -> Value {
    let html = html_body(&note.content, &note.video_url);
    let text = text_body(&note.content, &note.video_url);
    match mailer {
        Mailer::Resend { from, .. } => json!({
            "from": from,
            "to": [note.to],
            "subject": note.subject(),
            "html": html,
            "text": text,
        }),
        Mailer::SendGrid { from, .. } => json!({
            "personalizations": [{"to": [{"email": note.to}], "subject": note.subject()}],
            "from": {"email": from, "name": "BibiGPT"},
            "content": [
                {"type": "text/plain", "value": text},
                {"type": "text/html", "value": html},
            ],
        }),
    }
}

/// Send the note; returns the provider's message id when it reports one
pub async fn send(client: &reqwest::Client, config: &EmailConfig, note: &EmailNote) -> Result<Option<String>> {
    if note.to.is_empty() || !note.to.contains('@') || note.content.is_empty() {
        return Err(NoteError::Invalid("Missing required fields: to and content".to_string()).into());
    }
    let mailer = Mailer::from_config(config)?;
    let body = request_body(&mailer, note);

    let (url, api_key, name) = match &mailer {
        Mailer::Resend { api_key, .. } => (RESEND_URL, api_key, "Resend"),
        Mailer::SendGrid { api_key, .. } => (SENDGRID_URL, api_key, "SendGrid"),
    };
    let resp = client.post(url).bearer_auth(api_key).json(&body).send().await?;
    let json = check_response(resp, &format!("Failed to send email via {name}")).await?;

    info!("Sent summary email to {} via {name}", note.to);
    Ok(json.get("id").and_then(Value::as_str).map(String::from))
}

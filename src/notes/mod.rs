//! Sending a finished summary somewhere else: Notion, email, Flomo, Lark,
//! or an Obsidian-ready Markdown file.

pub mod email;
pub mod notion;
pub mod obsidian;
pub mod webhook;

/// Footer appended to every note that leaves the app
pub fn source_line(video_url: &str) -> String {
    format!("原视频：{video_url}")
}

/// Failure categories the HTTP layer maps onto status codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteError {
    /// Request is missing something it needs
    Invalid(String),
    /// No provider is configured on the server
    NotConfigured(String),
    /// A provider is configured but cannot be used from here
    Unsupported(String),
    /// The provider rejected the request
    Upstream { status: u16, message: String },
}

impl NoteError {
    pub fn status(&self) -> u16 {
        match self {
            NoteError::Invalid(_) | NoteError::NotConfigured(_) => 400,
            NoteError::Unsupported(_) => 501,
            NoteError::Upstream { .. } => 502,
        }
    }
}

impl std::fmt::Display for NoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoteError::Invalid(msg) | NoteError::NotConfigured(msg) | NoteError::Unsupported(msg) => {
                write!(f, "{msg}")
            }
            NoteError::Upstream { status, message } => write!(f, "{message} (status {status})"),
        }
    }
}

impl std::error::Error for NoteError {}

/// Turn a non-success provider response into `NoteError::Upstream`, using the
/// provider's own `message` field when it sends one
pub(crate) async fn check_response(resp: reqwest::Response, fallback: &str) -> eyre::Result<serde_json::Value> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let json: serde_json::Value = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);

    if !status.is_success() {
        let message = json
            .get("message")
            .or_else(|| json.get("msg"))
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| fallback.to_string());
        log::warn!("{fallback}: {status} {body}");
        return Err(NoteError::Upstream {
            status: status.as_u16(),
            message,
        }
        .into());
    }
    Ok(json)
}

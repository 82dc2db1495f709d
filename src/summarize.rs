use eyre::{Result, bail};
use futures_util::StreamExt;
use log::debug;
use serde::Serialize;

use crate::keys::ApiConfig;
use crate::{Transcript, VideoConfig, prompt};

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// OpenAI chat-completions request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub stream: bool,
}

impl ChatRequest {
    /// A single user message, the shape every summary request takes
    pub fn user(model: &str, prompt: String, max_tokens: u32) -> Self {
        ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            max_tokens,
            stream: false,
        }
    }
}

/// Summary request for a transcript, sized by the caller's detail level
pub fn summary_request(
    model: &str,
    transcript: &Transcript,
    video: &VideoConfig,
    show_timestamp: bool,
    has_user_key: bool,
) -> ChatRequest {
    let prompt = prompt::for_transcript(transcript, video, show_timestamp);
    ChatRequest::user(model, prompt, prompt::max_tokens(&video.settings, has_user_key))
}

async fn send(client: &reqwest::Client, api: &ApiConfig, request: &ChatRequest) -> Result<reqwest::Response> {
    debug!(
        "Chat completion via {} with model {} (stream={})",
        api.base_url, request.model, request.stream
    );

    let resp = client
        .post(format!("{}/chat/completions", api.base_url))
        .bearer_auth(&api.api_key)
        .json(request)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!("OpenAI API returned {status}: {body}");
    }
    Ok(resp)
}

/// Non-streaming completion
pub async fn complete(client: &reqwest::Client, api: &ApiConfig, request: ChatRequest) -> Result<String> {
    let request = ChatRequest { stream: false, ..request };
    let resp = send(client, api, &request).await?;
    let json: serde_json::Value = resp.json().await?;
    extract_openai_text(&json)
}

/// Streaming completion. Each content delta is handed to `on_delta` as it
/// arrives; the full text is returned once the stream ends.
pub async fn stream_chat<F>(client: &reqwest::Client, api: &ApiConfig, request: ChatRequest, mut on_delta: F) -> Result<String>
where
    F: FnMut(&str),
{
    let request = ChatRequest { stream: true, ..request };
    let resp = send(client, api, &request).await?;

    let mut decoder = ChatStreamDecoder::default();
    let mut full = String::new();
    let mut body = resp.bytes_stream();

    while let Some(chunk) = body.next().await {
        for delta in decoder.feed(&chunk?)? {
            on_delta(&delta);
            full.push_str(&delta);
        }
        if decoder.is_done() {
            break;
        }
    }
    for delta in decoder.finish()? {
        on_delta(&delta);
        full.push_str(&delta);
    }

    debug!("Stream finished with {} chars", full.chars().count());
    Ok(full)
}

/// Incremental parser for OpenAI `data:` event lines. Lines may be split
/// across network chunks; the partial tail is kept until its newline arrives.
#[derive(Debug, Default)]
pub struct ChatStreamDecoder {
    pending: Vec<u8>,
    done: bool,
}

impl ChatStreamDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.pending.extend_from_slice(bytes);
        let mut deltas = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(delta) = self.parse_line(line.trim())? {
                deltas.push(delta);
            }
        }
        Ok(deltas)
    }

    /// Flush a final line that arrived without a trailing newline
    pub fn finish(&mut self) -> Result<Vec<String>> {
        let rest = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&rest);
        Ok(self.parse_line(line.trim())?.into_iter().collect())
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn parse_line(&mut self, line: &str) -> Result<Option<String>> {
        if self.done {
            return Ok(None);
        }
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return Ok(None);
        }

        let json: serde_json::Value = match serde_json::from_str(data) {
            Ok(json) => json,
            Err(e) => {
                debug!("Skipping malformed stream line: {e}");
                return Ok(None);
            }
        };
        if let Some(message) = json.get("error").and_then(|e| e.get("message")).and_then(|m| m.as_str()) {
            bail!("OpenAI stream error: {message}");
        }

        Ok(json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(String::from))
    }
}

fn extract_openai_text(json: &serde_json::Value) -> Result<String> {
    if let Some(text) = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
    {
        return Ok(text.to_string());
    }
    bail!("unexpected OpenAI API response format");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_request() {
        use crate::{Segment, SummarySettings, TranscriptSource, VideoService};

        let transcript = Transcript {
            video_id: "BV1".to_string(),
            service: VideoService::Bilibili,
            title: "T".to_string(),
            source: TranscriptSource::Subtitle,
            segments: vec![Segment::new(1, "hello", Some(3.0))],
            description: None,
            duration: None,
        };
        let video = VideoConfig {
            video_id: "BV1".to_string(),
            settings: SummarySettings {
                detail_level: Some(900),
                ..Default::default()
            },
            ..Default::default()
        };
        let request = summary_request("gpt-4o-mini", &transcript, &video, true, false);
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.max_tokens, 900);
        assert!(request.messages[0].content.contains("[00:03] hello"));
    }

    #[test]
    fn test_extract_openai_text() {
        let json = serde_json::json!({
            "choices": [
                {
                    "message": {
                        "role": "assistant",
                        "content": "Summary of the video."
                    }
                }
            ]
        });
        assert_eq!(extract_openai_text(&json).unwrap(), "Summary of the video.");
    }

    #[test]
    fn test_extract_openai_text_empty() {
        let json = serde_json::json!({"choices": []});
        assert!(extract_openai_text(&json).is_err());
    }

    #[test]
    fn test_request_body() {
        let req = ChatRequest::user("gpt-4o-mini", "hi".to_string(), 1500);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 1500);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_decoder_basic() {
        let mut decoder = ChatStreamDecoder::default();
        let input = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let deltas = decoder.feed(input.as_bytes()).unwrap();
        assert_eq!(deltas, vec!["Hel", "lo"]);
        assert!(decoder.is_done());
    }

    #[test]
    fn test_decoder_split_across_chunks() {
        let mut decoder = ChatStreamDecoder::default();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"你好\"}}]}\n";
        let bytes = line.as_bytes();
        // split inside a multi-byte character
        let cut = line.find("你").unwrap() + 1;
        assert!(decoder.feed(&bytes[..cut]).unwrap().is_empty());
        assert_eq!(decoder.feed(&bytes[cut..]).unwrap(), vec!["你好"]);
        assert!(!decoder.is_done());
    }

    #[test]
    fn test_decoder_finish_without_newline() {
        let mut decoder = ChatStreamDecoder::default();
        assert!(decoder.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}").unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap(), vec!["end"]);
    }

    #[test]
    fn test_decoder_ignores_noise_and_stops_at_done() {
        let mut decoder = ChatStreamDecoder::default();
        let input = ": keep-alive\nevent: x\ndata: not json\ndata: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n";
        assert!(decoder.feed(input.as_bytes()).unwrap().is_empty());
        assert!(decoder.is_done());
    }

    #[test]
    fn test_decoder_error_payload() {
        let mut decoder = ChatStreamDecoder::default();
        let input = "data: {\"error\":{\"message\":\"quota exceeded\"}}\n";
        let err = decoder.feed(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    /// Local stand-in for an OpenAI-compatible endpoint. Streamed replies are
    /// cut mid-line to exercise the decoder across chunks.
    async fn mock_chat() -> String {
        use axum::body::Body;
        use axum::http::{HeaderMap, StatusCode, header};
        use axum::response::{IntoResponse, Json, Response};

        async fn completions(headers: HeaderMap, Json(req): Json<serde_json::Value>) -> Response {
            let authorized = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == "Bearer sk-test");
            if !authorized {
                return (StatusCode::UNAUTHORIZED, "bad key").into_response();
            }
            if req["stream"] != true {
                return Json(serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": "整段总结"}}]
                }))
                .into_response();
            }
            let chunks = vec![
                "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"你\"}}]}\n\ndata: {\"choi",
                "ces\":[{\"delta\":{\"content\":\"好\"}}]}\n\n",
                "data: [DONE]\n\n",
            ];
            let body = Body::from_stream(futures_util::stream::iter(
                chunks.into_iter().map(Ok::<_, std::convert::Infallible>),
            ));
            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }

        let app = axum::Router::new().route("/v1/chat/completions", axum::routing::post(completions));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn api(base_url: String, key: &str) -> ApiConfig {
        ApiConfig {
            api_key: key.to_string(),
            base_url,
        }
    }

    #[tokio::test]
    async fn test_stream_chat_over_http() {
        let base = mock_chat().await;
        let client = reqwest::Client::new();
        let mut seen = Vec::new();
        let request = ChatRequest::user("gpt-4o-mini", "总结".to_string(), 100);

        let full = stream_chat(&client, &api(base, "sk-test"), request, |delta| seen.push(delta.to_string()))
            .await
            .unwrap();
        assert_eq!(seen, vec!["你", "好"]);
        assert_eq!(full, "你好");
    }

    #[tokio::test]
    async fn test_complete_over_http() {
        let base = mock_chat().await;
        let client = reqwest::Client::new();
        let request = ChatRequest::user("gpt-4o-mini", "总结".to_string(), 100);
        let text = complete(&client, &api(base, "sk-test"), request).await.unwrap();
        assert_eq!(text, "整段总结");
    }

    #[tokio::test]
    async fn test_rejected_key_is_an_error() {
        let base = mock_chat().await;
        let client = reqwest::Client::new();
        let request = ChatRequest::user("gpt-4o-mini", "总结".to_string(), 100);
        let err = stream_chat(&client, &api(base, "sk-wrong"), request, |_| {}).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}

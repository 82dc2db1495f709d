//! HTTP API: streamed summaries over SSE plus JSON routes for notes and the
//! local record store.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;
use eyre::Result;
use futures_util::Stream;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::config::Config;
use crate::events::{Progress, Stage, StreamEvent};
use crate::fetch::{FetchContext, NoTranscript, fetch_subtitle};
use crate::keys::select_api_key;
use crate::notes::email::{self, EmailNote};
use crate::notes::notion::{self, NotionNote};
use crate::notes::webhook::{self, Hook, WebhookNote};
use crate::notes::NoteError;
use crate::prompt::{self, EditAction};
use crate::store::{NewTemplate, NewVideoHistory, PreferencesUpdate, Store, TemplateUpdate};
use crate::summarize::{self, ChatRequest};
use crate::{Segment, SummarySettings, Transcript, TranscriptSource, UserConfig, VideoConfig, media};

const POLISH_MAX_TOKENS: u32 = 2000;

pub struct AppState {
    pub config: Config,
    pub client: reqwest::Client,
    pub store: Store,
    pub started: Instant,
    /// Read and write the transcript cache
    pub use_cache: bool,
}

impl AppState {
    pub fn new(config: Config, store: Store) -> Self {
        AppState {
            config,
            client: reqwest::Client::new(),
            store,
            started: Instant::now(),
            use_cache: true,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    message: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        ApiError {
            status,
            error: error.into(),
            message: None,
        }
    }

    fn bad_request(error: impl Into<String>) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, error)
    }

    fn not_found(error: impl Into<String>) -> Self {
        ApiError::new(StatusCode::NOT_FOUND, error)
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl From<eyre::Report> for ApiError {
    fn from(report: eyre::Report) -> Self {
        match report.downcast_ref::<NoteError>() {
            Some(note) => {
                let status = StatusCode::from_u16(note.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                ApiError::new(status, note.to_string())
            }
            None => {
                warn!("Request failed: {report:#}");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, report.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.message {
            Some(message) => json!({"error": self.error, "errorMessage": message}),
            None => json!({"error": self.error}),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

type EventStream = Sse<Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>>;

/// Forward pipeline events to the client until every sender is dropped
fn event_stream(rx: UnboundedReceiver<StreamEvent>) -> EventStream {
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok(Event::default().data(event.to_json())), rx))
    });
    let stream: Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> = Box::pin(stream);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Map a pipeline failure onto the `error` event the client renders
fn error_event(report: &eyre::Report) -> StreamEvent {
    match report.downcast_ref::<NoTranscript>() {
        Some(no) => StreamEvent::error(no.error(), no.message()),
        None => StreamEvent::error("生成总结失败", report.to_string()),
    }
}

/// Run a streaming job on its own task; its error, if any, becomes the last event
fn spawn_stream<F, Fut>(job: F) -> EventStream
where
    F: FnOnce(Progress) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let progress = Progress::new(tx);
    let fut = job(progress.clone());
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            warn!("Stream failed: {e:#}");
            progress.send(error_event(&e));
        }
    });
    event_stream(rx)
}

async fn stream_summary(
    state: &AppState,
    request: ChatRequest,
    user_key: Option<&str>,
    progress: &Progress,
) -> Result<String> {
    let api = select_api_key(user_key, &state.config)?;
    let summary = summarize::stream_chat(&state.client, &api, request, |delta| {
        progress.send(StreamEvent::Delta {
            content: delta.to_string(),
        })
    })
    .await?;
    progress.send(StreamEvent::Done);
    Ok(summary)
}

fn has_key(user_key: Option<&str>) -> bool {
    user_key.is_some_and(|k| !k.trim().is_empty())
}

// sumup

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SumupRequest {
    #[serde(default)]
    pub video_config: VideoConfig,
    #[serde(default)]
    pub user_config: UserConfig,
}

async fn run_sumup(state: Arc<AppState>, req: SumupRequest, progress: Progress) -> Result<()> {
    let video = &req.video_config;
    let user_key = req.user_config.user_key.as_deref();
    let show_timestamp = req.user_config.show_timestamp();

    let ctx = FetchContext {
        client: &state.client,
        config: &state.config,
        user_key,
        progress: progress.clone(),
        use_cache: state.use_cache,
    };
    let transcript = fetch_subtitle(&ctx, video).await?;

    progress.send(StreamEvent::Metadata {
        duration: transcript.duration,
        title: Some(transcript.title.clone()),
        subtitle_source: Some(transcript.source),
        subtitles_count: Some(transcript.segments.len()),
        subtitles_array: Some(transcript.segments.clone()),
    });
    if progress.is_closed() {
        debug!("Client went away before summarizing {}", video.video_id);
        return Ok(());
    }

    progress.stage(Stage::GeneratingSummary, "正在生成 AI 总结...", 60);
    let request = summarize::summary_request(
        state.config.model(),
        &transcript,
        video,
        show_timestamp,
        has_key(user_key),
    );
    let summary = stream_summary(&state, request, user_key, &progress).await?;

    let entry = NewVideoHistory {
        video_id: video.video_id.clone(),
        video_url: media::source_url(video),
        title: transcript.title.clone(),
        summary,
        video_service: video.service.to_string(),
        subtitles_array: Some(transcript.segments),
    };
    if let Err(e) = state.store.add_history(entry) {
        warn!("Failed to record history: {e}");
    }
    if let Err(e) = state.store.record_config_usage(&video.settings) {
        warn!("Failed to record config usage: {e}");
    }
    Ok(())
}

async fn sumup(State(state): State<Arc<AppState>>, Json(req): Json<SumupRequest>) -> ApiResult<EventStream> {
    if req.video_config.video_id.trim().is_empty() {
        return Err(ApiError::bad_request("No videoId in the request"));
    }
    info!(
        "Summarizing {} video {}",
        req.video_config.service, req.video_config.video_id
    );
    Ok(spawn_stream(move |progress| run_sumup(state, req, progress)))
}

// resummarize

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResummarizeRequest {
    #[serde(default)]
    pub subtitles_array: Vec<Segment>,
    #[serde(default)]
    pub video_config: VideoConfig,
    #[serde(default)]
    pub user_config: UserConfig,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub custom_prompt: Option<String>,
}

async fn run_resummarize(state: Arc<AppState>, req: ResummarizeRequest, progress: Progress) -> Result<()> {
    let mut video = req.video_config;
    if let Some(custom) = req.custom_prompt.filter(|p| !p.trim().is_empty()) {
        video.custom_prompt = Some(custom);
    }
    let user_key = req.user_config.user_key.as_deref();

    progress.stage(Stage::GeneratingSummary, "正在使用新设置重新生成总结...", 30);
    let transcript = Transcript {
        video_id: video.video_id.clone(),
        service: video.service,
        title: req.title.unwrap_or_default(),
        source: TranscriptSource::Subtitle,
        segments: req.subtitles_array,
        description: None,
        duration: req.duration,
    };
    progress.send(StreamEvent::Metadata {
        duration: transcript.duration,
        title: Some(transcript.title.clone()),
        subtitle_source: Some(TranscriptSource::Subtitle),
        subtitles_count: Some(transcript.segments.len()),
        subtitles_array: None,
    });

    progress.stage(Stage::GeneratingSummary, "正在调用 AI 模型...", 50);
    let request = summarize::summary_request(
        state.config.model(),
        &transcript,
        &video,
        req.user_config.show_timestamp(),
        has_key(user_key),
    );
    progress.stage(Stage::GeneratingSummary, "正在生成 AI 总结...", 60);
    stream_summary(&state, request, user_key, &progress).await?;
    Ok(())
}

async fn resummarize(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResummarizeRequest>,
) -> ApiResult<EventStream> {
    if req.subtitles_array.is_empty() {
        return Err(ApiError::bad_request("无字幕数据")
            .with_message("当前视频没有缓存的字幕数据，无法重新生成总结。请重新总结该视频。"));
    }
    Ok(spawn_stream(move |progress| run_resummarize(state, req, progress)))
}

// polish

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolishRequest {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub action: EditAction,
    pub user_key: Option<String>,
    pub video_config: Option<VideoConfig>,
}

async fn polish(State(state): State<Arc<AppState>>, Json(req): Json<PolishRequest>) -> ApiResult<EventStream> {
    if req.summary.trim().is_empty() {
        return Err(ApiError::bad_request("Summary is required"));
    }
    Ok(spawn_stream(move |progress| async move {
        let language = req
            .video_config
            .as_ref()
            .and_then(|v| v.settings.output_language.as_deref());
        let prompt = prompt::edit_prompt(req.action, &req.summary, language);
        let request = ChatRequest::user(state.config.model(), prompt, POLISH_MAX_TOKENS);
        stream_summary(&state, request, req.user_key.as_deref(), &progress).await?;
        Ok::<(), eyre::Report>(())
    }))
}

// notes

async fn note_notion(State(state): State<Arc<AppState>>, Json(note): Json<NotionNote>) -> ApiResult<Json<serde_json::Value>> {
    let page_id = notion::save(&state.client, &note).await?;
    Ok(Json(json!({"success": true, "pageId": page_id})))
}

async fn note_email(State(state): State<Arc<AppState>>, Json(note): Json<EmailNote>) -> ApiResult<Json<serde_json::Value>> {
    let message_id = email::send(&state.client, &state.config.email, &note).await?;
    Ok(Json(json!({"success": true, "messageId": message_id})))
}

async fn note_flomo(State(state): State<Arc<AppState>>, Json(note): Json<WebhookNote>) -> ApiResult<Json<serde_json::Value>> {
    webhook::post(&state.client, Hook::Flomo, &note).await?;
    Ok(Json(json!({"success": true})))
}

async fn note_lark(State(state): State<Arc<AppState>>, Json(note): Json<WebhookNote>) -> ApiResult<Json<serde_json::Value>> {
    webhook::post(&state.client, Hook::Lark, &note).await?;
    Ok(Json(json!({"success": true})))
}

// history

async fn list_history(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!(state.store.history()))
}

async fn clear_history(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    state.store.clear_history()?;
    Ok(Json(json!({"success": true})))
}

async fn remove_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.store.remove_history(&id)? {
        return Err(ApiError::not_found(format!("history entry not found: {id}")));
    }
    Ok(Json(json!({"success": true})))
}

// templates

async fn list_templates(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!(state.store.templates()))
}

async fn add_template(
    State(state): State<Arc<AppState>>,
    Json(template): Json<NewTemplate>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if template.name.trim().is_empty() {
        return Err(ApiError::bad_request("Template name is required"));
    }
    let created = state.store.add_template(template)?;
    Ok((StatusCode::CREATED, Json(json!(created))))
}

async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<TemplateUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    if state.store.template(&id).is_none() {
        return Err(ApiError::not_found(format!("template not found: {id}")));
    }
    Ok(Json(json!(state.store.update_template(&id, update)?)))
}

async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    match state.store.template(&id) {
        None => Err(ApiError::not_found(format!("template not found: {id}"))),
        Some(t) if t.is_default() => Err(ApiError::bad_request("The default template cannot be deleted")),
        Some(_) => {
            state.store.delete_template(&id)?;
            Ok(Json(json!({"success": true})))
        }
    }
}

// preferences

async fn get_preferences(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!(state.store.preferences()))
}

async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Json(update): Json<PreferencesUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(json!(state.store.update_preferences(update)?)))
}

async fn record_usage(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<SummarySettings>,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(json!(state.store.record_config_usage(&settings)?)))
}

async fn reset_preferences(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(json!(state.store.reset_preferences()?)))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("GIT_DESCRIBE"),
        "uptimeSecs": state.started.elapsed().as_secs(),
        "audioTranscription": state.config.audio_transcription_enabled(),
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/sumup", post(sumup))
        .route("/api/resummarize", post(resummarize))
        .route("/api/polish", post(polish))
        .route("/api/notes/notion", post(note_notion))
        .route("/api/notes/email", post(note_email))
        .route("/api/notes/flomo", post(note_flomo))
        .route("/api/notes/lark", post(note_lark))
        .route("/api/history", get(list_history).delete(clear_history))
        .route("/api/history/:id", delete(remove_history))
        .route("/api/templates", get(list_templates).post(add_template))
        .route("/api/templates/:id", put(update_template).delete(delete_template))
        .route("/api/preferences", get(get_preferences).put(update_preferences))
        .route("/api/preferences/usage", post(record_usage))
        .route("/api/preferences/reset", post(reset_preferences))
        .route("/api/health", get(health))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(config: Config, store: Store) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    let state = Arc::new(AppState::new(config, store));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

//! The subtitle acquisition chain: platform subtitles, then audio
//! transcription, then the video description.

use eyre::{Result, bail};
use log::{debug, info, warn};
use rand::seq::SliceRandom;

use crate::config::Config;
use crate::events::{Progress, Stage};
use crate::keys::select_api_key;
use crate::media::AudioSource;
use crate::whisper::{WhisperModel, transcribed_duration};
use crate::{
    Segment, Subtitles, Transcript, TranscriptSource, VideoConfig, VideoService, bilibili, cache, douyin, media,
    whisper, youtube, ytdlp,
};

/// Everything the chain needs besides the video itself
pub struct FetchContext<'a> {
    pub client: &'a reqwest::Client,
    pub config: &'a Config,
    pub user_key: Option<&'a str>,
    pub progress: Progress,
    pub use_cache: bool,
}

/// Neither subtitles, audio nor a description produced any text
#[derive(Debug)]
pub struct NoTranscript {
    pub audio_attempted: bool,
    pub detail: Option<String>,
}

impl NoTranscript {
    pub fn error(&self) -> &'static str {
        "此视频暂无字幕或简介"
    }

    pub fn message(&self) -> String {
        let base = if self.audio_attempted {
            "抱歉，该视频没有字幕，且音频转文字失败。请检查服务器配置（需要安装 yt-dlp）或尝试其他视频。"
        } else {
            "抱歉，该视频没有字幕或简介内容。音频转文字未启用，请开启 ENABLE_AUDIO_TRANSCRIPTION 或尝试其他视频。"
        };
        match &self.detail {
            Some(detail) => format!("{base}\n{detail}"),
            None => base.to_string(),
        }
    }
}

impl std::fmt::Display for NoTranscript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error())
    }
}

impl std::error::Error for NoTranscript {}

/// Run the platform extractor; a failed lookup counts as "no subtitles"
async fn extract(ctx: &FetchContext<'_>, video: &VideoConfig) -> Subtitles {
    let id = video.video_id.as_str();
    let result = match video.service {
        VideoService::Bilibili => {
            bilibili::fetch_subtitles(ctx.client, id, video.page_number.as_deref(), &ctx.config.bilibili_sessdata)
                .await
        }
        VideoService::Youtube => youtube::fetch_subtitles(ctx.client, id).await,
        VideoService::Douyin => Ok(douyin::fetch_subtitles(ctx.client, id, &ctx.config.douyin).await),
        _ => Ok(media::fetch_subtitles(video)),
    };
    result.unwrap_or_else(|e| {
        warn!("{} subtitle extraction failed for {id}: {e}", video.service);
        Subtitles::empty(id)
    })
}

pub fn cookies_for(video: &VideoConfig, config: &Config) -> ytdlp::Cookies {
    match video.service {
        VideoService::Douyin => douyin::cookies(&config.douyin),
        VideoService::Bilibili => match config.bilibili_sessdata.choose(&mut rand::thread_rng()) {
            Some(token) => ytdlp::Cookies::Sessdata(token.clone()),
            None => ytdlp::Cookies::None,
        },
        _ => ytdlp::Cookies::None,
    }
}

/// Download (or read) the audio and run it through Whisper. Fills in the
/// title and duration from yt-dlp when the extractor could not.
async fn transcribe(ctx: &FetchContext<'_>, video: &VideoConfig, found: &mut Subtitles) -> Result<Vec<Segment>> {
    let api = select_api_key(ctx.user_key, ctx.config)?;
    let model = ctx
        .config
        .whisper_model
        .as_deref()
        .and_then(WhisperModel::from_name)
        .unwrap_or_default();
    let lang = ctx.config.whisper_language();

    match media::audio_source(video)? {
        AudioSource::Local(path) => {
            ctx.progress.stage(Stage::TranscribingAudio, "正在转写本地音频...", 40);
            whisper::transcribe_audio(ctx.client, &api, &path, &model, lang).await
        }
        AudioSource::Remote(url) => {
            if !ytdlp::is_available().await {
                bail!("yt-dlp 未安装。请运行: pip install yt-dlp 或 brew install yt-dlp");
            }
            let cookies = cookies_for(video, ctx.config);

            if found.title == video.video_id || found.duration.is_none() {
                match ytdlp::video_info(&url, &cookies).await {
                    Ok(info) => {
                        if found.title == video.video_id {
                            if let Some(title) = info.title {
                                found.title = title;
                            }
                        }
                        found.duration = found.duration.or(info.duration);
                    }
                    Err(e) => debug!("Could not read video info: {e}"),
                }
            }

            ctx.progress.stage(Stage::TranscribingAudio, "正在下载音频...", 30);
            let dir = tempfile::Builder::new().prefix("bibi-audio-").tempdir()?;
            let audio = ytdlp::download_audio(&url, dir.path(), &cookies).await?;

            ctx.progress.stage(Stage::TranscribingAudio, "正在进行音频转文字...", 45);
            whisper::transcribe_audio(ctx.client, &api, &audio, &model, lang).await
        }
    }
}

/// Resolve a transcript for a video, falling back from platform subtitles to
/// audio transcription to the description text
pub async fn fetch_subtitle(ctx: &FetchContext<'_>, video: &VideoConfig) -> Result<Transcript> {
    if ctx.use_cache {
        if let Some(transcript) = cache::load(video) {
            info!("Using cached transcript for {}", video.video_id);
            return Ok(transcript);
        }
    }

    ctx.progress.stage(Stage::FetchingSubtitle, "正在获取字幕...", 10);
    let found = extract(ctx, video).await;
    resolve(ctx, video, found).await
}

/// Turn what the extractor found into a transcript, running the audio and
/// description fallbacks when it found no subtitles
async fn resolve(ctx: &FetchContext<'_>, video: &VideoConfig, mut found: Subtitles) -> Result<Transcript> {
    let mut transcript = Transcript {
        video_id: video.video_id.clone(),
        service: video.service,
        title: String::new(),
        source: TranscriptSource::Subtitle,
        segments: Vec::new(),
        description: found.description.clone(),
        duration: found.duration,
    };

    if !found.segments.is_empty() {
        info!("Found {} subtitle segments", found.segments.len());
        transcript.segments = std::mem::take(&mut found.segments);
    } else {
        let mut audio_error = None;
        let audio_enabled = ctx.config.audio_transcription_enabled();

        if audio_enabled {
            info!("No subtitles for {}, trying audio transcription", video.video_id);
            match transcribe(ctx, video, &mut found).await {
                Ok(segments) if !segments.is_empty() => {
                    transcript.source = TranscriptSource::Audio;
                    transcript.duration = found.duration.or_else(|| transcribed_duration(&segments));
                    transcript.segments = segments;
                }
                Ok(_) => audio_error = Some("音频转文字没有识别出任何内容".to_string()),
                Err(e) => {
                    warn!("Audio transcription failed: {e}");
                    audio_error = Some(format!("{e}"));
                }
            }
        }

        if transcript.segments.is_empty() {
            match found.description.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
                Some(description) => {
                    info!("Falling back to the video description");
                    transcript.source = TranscriptSource::Description;
                    transcript.segments = vec![Segment::new(1, description, None)];
                }
                None => {
                    return Err(NoTranscript {
                        audio_attempted: audio_enabled,
                        detail: audio_error,
                    }
                    .into());
                }
            }
        }
    }

    transcript.title = if found.title.trim().is_empty() {
        video.video_id.clone()
    } else {
        found.title
    };

    if ctx.use_cache && transcript.source != TranscriptSource::Description {
        if let Err(e) = cache::save(video, &transcript) {
            warn!("Failed to cache transcript: {e}");
        }
    }
    Ok(transcript)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_transcript_messages() {
        let err = NoTranscript {
            audio_attempted: true,
            detail: Some("yt-dlp 未安装".to_string()),
        };
        assert_eq!(err.to_string(), "此视频暂无字幕或简介");
        assert!(err.message().contains("音频转文字失败"));
        assert!(err.message().ends_with("yt-dlp 未安装"));

        let err = NoTranscript {
            audio_attempted: false,
            detail: None,
        };
        assert!(err.message().contains("ENABLE_AUDIO_TRANSCRIPTION"));
    }

    #[test]
    fn test_no_transcript_downcast() {
        let report: eyre::Report = NoTranscript {
            audio_attempted: false,
            detail: None,
        }
        .into();
        assert!(report.downcast_ref::<NoTranscript>().is_some());
    }

    #[test]
    fn test_cookies_for() {
        let config = Config {
            bilibili_sessdata: vec!["tok".to_string()],
            ..Default::default()
        };
        let bili = VideoConfig {
            video_id: "BV1".to_string(),
            ..Default::default()
        };
        assert_eq!(cookies_for(&bili, &config), ytdlp::Cookies::Sessdata("tok".to_string()));

        let yt = VideoConfig {
            video_id: "abc".to_string(),
            service: VideoService::Youtube,
            ..Default::default()
        };
        assert_eq!(cookies_for(&yt, &config), ytdlp::Cookies::None);

        let dy = VideoConfig {
            video_id: "1".to_string(),
            service: VideoService::Douyin,
            ..Default::default()
        };
        assert_eq!(cookies_for(&dy, &config), ytdlp::Cookies::Browser("chrome".to_string()));
    }

    #[tokio::test]
    async fn test_audio_disabled_without_description_is_an_error() {
        let config = Config {
            enable_audio_transcription: Some(false),
            ..Default::default()
        };
        let client = reqwest::Client::new();
        let ctx = FetchContext {
            client: &client,
            config: &config,
            user_key: None,
            progress: Progress::none(),
            use_cache: false,
        };
        let video = VideoConfig {
            video_id: "ep-1".to_string(),
            service: VideoService::Podcast,
            ..Default::default()
        };
        let err = fetch_subtitle(&ctx, &video).await.unwrap_err();
        let no = err.downcast_ref::<NoTranscript>().unwrap();
        assert!(!no.audio_attempted);
    }

    fn context<'a>(client: &'a reqwest::Client, config: &'a Config, use_cache: bool) -> FetchContext<'a> {
        FetchContext {
            client,
            config,
            user_key: None,
            progress: Progress::none(),
            use_cache,
        }
    }

    #[tokio::test]
    async fn test_description_fallback_is_used_and_not_cached() {
        let config = Config {
            enable_audio_transcription: Some(false),
            ..Default::default()
        };
        let client = reqwest::Client::new();
        let ctx = context(&client, &config, true);
        let video = VideoConfig {
            video_id: format!("BVdesc{}", std::process::id()),
            ..Default::default()
        };
        let found = Subtitles {
            title: "一期节目".to_string(),
            description: Some("  本期讨论 Rust 异步运行时。  ".to_string()),
            duration: Some(300.0),
            ..Default::default()
        };

        let transcript = resolve(&ctx, &video, found).await.unwrap();
        assert_eq!(transcript.source, TranscriptSource::Description);
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.segments[0].text, "本期讨论 Rust 异步运行时。");
        assert_eq!(transcript.segments[0].start, None);
        assert_eq!(transcript.title, "一期节目");
        assert_eq!(transcript.duration, Some(300.0));
        assert!(cache::load(&video).is_none());
    }

    #[tokio::test]
    async fn test_subtitles_win_over_description() {
        let config = Config::default();
        let client = reqwest::Client::new();
        let ctx = context(&client, &config, false);
        let video = VideoConfig {
            video_id: "BVsubs".to_string(),
            ..Default::default()
        };
        let found = Subtitles {
            title: "  ".to_string(),
            segments: vec![Segment::new(1, "大家好", Some(0.5))],
            description: Some("简介".to_string()),
            duration: None,
        };

        let transcript = resolve(&ctx, &video, found).await.unwrap();
        assert_eq!(transcript.source, TranscriptSource::Subtitle);
        assert_eq!(transcript.segments[0].text, "大家好");
        assert_eq!(transcript.description.as_deref(), Some("简介"));
        assert_eq!(transcript.title, "BVsubs");
    }
}

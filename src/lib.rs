pub mod bilibili;
pub mod cache;
pub mod config;
pub mod douyin;
pub mod events;
pub mod export;
pub mod fetch;
pub mod keys;
pub mod link;
pub mod media;
pub mod notes;
pub mod output;
pub mod prompt;
pub mod server;
pub mod store;
pub mod subtitle;
pub mod summarize;
pub mod timestamp;
pub mod transcript;
pub mod whisper;
pub mod youtube;
pub mod ytdlp;

use serde::{Deserialize, Deserializer, Serialize};

/// Platform a link belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoService {
    #[default]
    Bilibili,
    Youtube,
    Douyin,
    Podcast,
    Meeting,
    LocalVideo,
    LocalAudio,
}

impl VideoService {
    /// Services that never carry a subtitle track
    pub fn is_audio_only(&self) -> bool {
        matches!(
            self,
            VideoService::Podcast | VideoService::Meeting | VideoService::LocalVideo | VideoService::LocalAudio
        )
    }

    pub fn is_local(&self) -> bool {
        matches!(self, VideoService::LocalVideo | VideoService::LocalAudio)
    }
}

impl std::fmt::Display for VideoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VideoService::Bilibili => "bilibili",
            VideoService::Youtube => "youtube",
            VideoService::Douyin => "douyin",
            VideoService::Podcast => "podcast",
            VideoService::Meeting => "meeting",
            VideoService::LocalVideo => "local-video",
            VideoService::LocalAudio => "local-audio",
        };
        write!(f, "{name}")
    }
}

/// User-tunable summary settings, sent alongside every video
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummarySettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentence_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outline_level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_timestamp: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_emoji: Option<bool>,
}

impl SummarySettings {
    /// Fill every unset field from `base`
    pub fn or(self, base: &SummarySettings) -> SummarySettings {
        SummarySettings {
            detail_level: self.detail_level.or(base.detail_level),
            sentence_number: self.sentence_number.or(base.sentence_number),
            outline_level: self.outline_level.or(base.outline_level),
            output_language: self.output_language.or_else(|| base.output_language.clone()),
            show_timestamp: self.show_timestamp.or(base.show_timestamp),
            show_emoji: self.show_emoji.or(base.show_emoji),
        }
    }
}

/// A video to summarize plus how to summarize it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConfig {
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub service: VideoService,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    #[serde(flatten)]
    pub settings: SummarySettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserConfig {
    pub user_key: Option<String>,
    pub should_show_timestamp: Option<bool>,
}

impl UserConfig {
    pub fn show_timestamp(&self) -> bool {
        self.should_show_timestamp.unwrap_or(false)
    }
}

/// A single subtitle item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub index: usize,
    /// Start offset in seconds
    #[serde(default, rename = "s", deserialize_with = "de_seconds", skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl Segment {
    pub fn new(index: usize, text: impl Into<String>, start: Option<f64>) -> Self {
        Segment {
            text: text.into(),
            index,
            start,
            duration: None,
        }
    }
}

/// Subtitle items sometimes arrive with `s` as a string ("12.5")
fn de_seconds<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Where the transcript text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptSource {
    Subtitle,
    Audio,
    Description,
}

impl std::fmt::Display for TranscriptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptSource::Subtitle => write!(f, "subtitle"),
            TranscriptSource::Audio => write!(f, "audio"),
            TranscriptSource::Description => write!(f, "description"),
        }
    }
}

/// What a platform extractor found before any audio fallback
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subtitles {
    pub title: String,
    pub segments: Vec<Segment>,
    pub description: Option<String>,
    pub duration: Option<f64>,
}

impl Subtitles {
    /// Nothing found; the id doubles as the title
    pub fn empty(video_id: &str) -> Self {
        Subtitles {
            title: video_id.to_string(),
            ..Default::default()
        }
    }
}

/// Complete transcript for a video
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub video_id: String,
    pub service: VideoService,
    pub title: String,
    pub source: TranscriptSource,
    pub segments: Vec<Segment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_or() {
        let base = SummarySettings {
            detail_level: Some(600),
            sentence_number: Some(5),
            output_language: Some("中文".to_string()),
            ..Default::default()
        };
        let merged = SummarySettings {
            sentence_number: Some(3),
            ..Default::default()
        }
        .or(&base);
        assert_eq!(merged.detail_level, Some(600));
        assert_eq!(merged.sentence_number, Some(3));
        assert_eq!(merged.output_language.as_deref(), Some("中文"));
        assert_eq!(merged.show_emoji, None);
    }

    #[test]
    fn test_video_config_camel_case() {
        let json = serde_json::json!({
            "videoId": "BV1xx411c7mD",
            "service": "bilibili",
            "pageNumber": "2",
            "detailLevel": 800,
            "outputLanguage": "English",
            "showEmoji": false
        });
        let config: VideoConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.video_id, "BV1xx411c7mD");
        assert_eq!(config.page_number.as_deref(), Some("2"));
        assert_eq!(config.settings.detail_level, Some(800));
        assert_eq!(config.settings.output_language.as_deref(), Some("English"));
        assert_eq!(config.settings.show_emoji, Some(false));
        assert!(config.settings.show_timestamp.is_none());
    }

    #[test]
    fn test_video_config_service_defaults_to_bilibili() {
        let config: VideoConfig = serde_json::from_value(serde_json::json!({"videoId": "BV1"})).unwrap();
        assert_eq!(config.service, VideoService::Bilibili);
    }

    #[test]
    fn test_service_kebab_case() {
        let json = serde_json::to_string(&VideoService::LocalAudio).unwrap();
        assert_eq!(json, "\"local-audio\"");
        assert_eq!(VideoService::LocalVideo.to_string(), "local-video");
    }

    #[test]
    fn test_segment_start_accepts_string() {
        let json = serde_json::json!([
            {"text": "a", "index": 1, "s": 12.5},
            {"text": "b", "index": 2, "s": "30"},
            {"text": "c", "index": 3}
        ]);
        let segments: Vec<Segment> = serde_json::from_value(json).unwrap();
        assert_eq!(segments[0].start, Some(12.5));
        assert_eq!(segments[1].start, Some(30.0));
        assert_eq!(segments[2].start, None);
    }

    #[test]
    fn test_audio_only_services() {
        assert!(VideoService::Podcast.is_audio_only());
        assert!(VideoService::LocalAudio.is_audio_only());
        assert!(!VideoService::Youtube.is_audio_only());
        assert!(!VideoService::Douyin.is_audio_only());
    }
}

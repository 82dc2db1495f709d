use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::{VideoConfig, VideoService};

static YOUTUBE_BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{11}$").unwrap());
static YOUTUBE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:youtube\.com/watch\?.*v=)([a-zA-Z0-9_-]{11})",
        r"youtu\.be/([a-zA-Z0-9_-]{11})",
        r"youtube\.com/embed/([a-zA-Z0-9_-]{11})",
        r"youtube\.com/shorts/([a-zA-Z0-9_-]{11})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});
static BILIBILI_BARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:BV[0-9A-Za-z]{10}|av\d+)$").unwrap());
static VIDEO_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/video/([^/?#]+)").unwrap());
static DOUYIN_VIDEO: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"douyin\.com/video/([^/?#]+)").unwrap());
static DOUYIN_SHORT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"v\.douyin\.com/([^/?#]+)").unwrap());
static ZOOM_RECORDING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"zoom\.us/rec/(?:share/|play/)?([^/?#]+)").unwrap());
static TEAMS_MEETING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"teams\.microsoft\.com/[^/]+/([^/?#]+)").unwrap());
static EPISODE_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/episode/([^/?#]+)").unwrap());
static ID_QUERY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?&]id=([^&#]+)").unwrap());
static NUMERIC_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/(\d{6,})(?:/|\.|$)").unwrap());
static AUDIO_FILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.(mp3|wav|ogg|m4a|aac|flac|opus)$").unwrap());
static VIDEO_FILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.(mp4|webm|mov|avi|mkv)$").unwrap());

/// Classify a submitted link (or local path) into a `VideoConfig`
pub fn extract_video_config(input: &str) -> Option<VideoConfig> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Some(service) = local_media_service(input) {
        return Some(config(service, input, input));
    }

    if input.contains("bilibili.com") {
        let id = VIDEO_PATH.captures(input)?[1].to_string();
        let mut config = config(VideoService::Bilibili, &id, input);
        config.page_number = extract_page(input);
        return Some(config);
    }

    if BILIBILI_BARE_ID.is_match(input) {
        return Some(VideoConfig {
            video_id: input.to_string(),
            service: VideoService::Bilibili,
            ..Default::default()
        });
    }

    if let Some(id) = extract_youtube_id(input) {
        return Some(config(VideoService::Youtube, &id, input));
    }

    if input.contains("douyin.com") {
        let id = extract_douyin_video_id(input)?;
        return Some(config(VideoService::Douyin, &id, input));
    }

    if let Some(id) = extract_meeting_id(input) {
        return Some(config(VideoService::Meeting, &id, input));
    }

    if let Some(id) = extract_podcast_id(input) {
        return Some(config(VideoService::Podcast, &id, input));
    }

    None
}

fn config(service: VideoService, id: &str, url: &str) -> VideoConfig {
    VideoConfig {
        video_id: id.to_string(),
        service,
        video_url: Some(url.to_string()),
        ..Default::default()
    }
}

fn local_media_service(input: &str) -> Option<VideoService> {
    if input.starts_with("http://") || input.starts_with("https://") {
        return None;
    }
    if !Path::new(input).is_file() {
        return None;
    }
    if AUDIO_FILE.is_match(input) {
        Some(VideoService::LocalAudio)
    } else if VIDEO_FILE.is_match(input) {
        Some(VideoService::LocalVideo)
    } else {
        None
    }
}

/// Extract video ID from various YouTube URL formats
pub fn extract_youtube_id(input: &str) -> Option<String> {
    let input = input.trim();

    if YOUTUBE_BARE_ID.is_match(input) {
        return Some(input.to_string());
    }

    YOUTUBE_PATTERNS
        .iter()
        .find_map(|re| re.captures(input).map(|caps| caps[1].to_string()))
}

/// Douyin video id; short links keep the whole URL so yt-dlp can resolve them
pub fn extract_douyin_video_id(input: &str) -> Option<String> {
    if let Some(caps) = DOUYIN_VIDEO.captures(input) {
        return Some(caps[1].to_string());
    }
    if DOUYIN_SHORT.is_match(input) {
        return Some(input.to_string());
    }
    None
}

pub fn extract_meeting_id(url: &str) -> Option<String> {
    if let Some(caps) = ZOOM_RECORDING.captures(url) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = TEAMS_MEETING.captures(url) {
        return Some(caps[1].to_string());
    }

    if url.to_lowercase().contains("meeting") {
        if let Some(caps) = ID_QUERY.captures(url) {
            return Some(caps[1].to_string());
        }
        if let Some(caps) = NUMERIC_ID.captures(url) {
            return Some(caps[1].to_string());
        }
    }

    if VIDEO_FILE.is_match(strip_query(url)) {
        return Some(url.to_string());
    }
    None
}

pub fn extract_podcast_id(url: &str) -> Option<String> {
    if let Some(caps) = EPISODE_PATH.captures(url) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = ID_QUERY.captures(url) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = NUMERIC_ID.captures(url) {
        return Some(caps[1].to_string());
    }
    if AUDIO_FILE.is_match(strip_query(url)) {
        return Some(url.to_string());
    }
    None
}

/// The `p` query parameter selecting a part of a multi-part Bilibili video
pub fn extract_page(input: &str) -> Option<String> {
    let parsed = url::Url::parse(input).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "p")
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_video_id() {
        assert_eq!(extract_youtube_id("dQw4w9WgXcQ"), Some("dQw4w9WgXcQ".to_string()));
    }

    #[test]
    fn test_watch_url_with_extra_params() {
        assert_eq!(
            extract_youtube_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=120"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_short_and_embed_urls() {
        assert_eq!(
            extract_youtube_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_youtube_id("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_youtube_id("https://www.youtube.com/shorts/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_bilibili_with_page() {
        let config = extract_video_config("https://www.bilibili.com/video/BV1xx411c7mD/?p=3&share=1").unwrap();
        assert_eq!(config.service, VideoService::Bilibili);
        assert_eq!(config.video_id, "BV1xx411c7mD");
        assert_eq!(config.page_number.as_deref(), Some("3"));
    }

    #[test]
    fn test_bilibili_bare_ids() {
        let config = extract_video_config("BV1xx411c7mD").unwrap();
        assert_eq!(config.service, VideoService::Bilibili);
        let config = extract_video_config("av170001").unwrap();
        assert_eq!(config.video_id, "av170001");
    }

    #[test]
    fn test_youtube_config() {
        let config = extract_video_config("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        assert_eq!(config.service, VideoService::Youtube);
        assert_eq!(config.video_id, "dQw4w9WgXcQ");
        assert_eq!(
            config.video_url.as_deref(),
            Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        );
    }

    #[test]
    fn test_douyin_links() {
        let config = extract_video_config("https://www.douyin.com/video/7301234567890123456").unwrap();
        assert_eq!(config.service, VideoService::Douyin);
        assert_eq!(config.video_id, "7301234567890123456");

        let config = extract_video_config("https://v.douyin.com/iRNBho6u/").unwrap();
        assert_eq!(config.service, VideoService::Douyin);
        assert_eq!(config.video_id, "https://v.douyin.com/iRNBho6u/");
    }

    #[test]
    fn test_meeting_links() {
        assert_eq!(
            extract_meeting_id("https://zoom.us/rec/share/abcDEF123"),
            Some("abcDEF123".to_string())
        );
        assert_eq!(
            extract_meeting_id("https://teams.microsoft.com/l/meeting42?ctx=1"),
            Some("meeting42".to_string())
        );
        assert_eq!(
            extract_meeting_id("https://cdn.example.com/recordings/all-hands.mp4"),
            Some("https://cdn.example.com/recordings/all-hands.mp4".to_string())
        );
        let config = extract_video_config("https://zoom.us/rec/share/abcDEF123").unwrap();
        assert_eq!(config.service, VideoService::Meeting);
    }

    #[test]
    fn test_podcast_links() {
        assert_eq!(
            extract_podcast_id("https://pod.example.com/episode/ep-12?ref=feed"),
            Some("ep-12".to_string())
        );
        assert_eq!(
            extract_podcast_id("https://pod.example.com/show?id=42"),
            Some("42".to_string())
        );
        assert_eq!(
            extract_podcast_id("https://pod.example.com/show/1234567"),
            Some("1234567".to_string())
        );
        let config = extract_video_config("https://media.example.com/ep1.mp3").unwrap();
        assert_eq!(config.service, VideoService::Podcast);
        assert_eq!(config.video_id, "https://media.example.com/ep1.mp3");
    }

    #[test]
    fn test_unrecognized_input() {
        assert!(extract_video_config("").is_none());
        assert!(extract_video_config("not a link").is_none());
        assert!(extract_video_config("https://example.com/about").is_none());
    }

    #[test]
    fn test_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talk.m4a");
        std::fs::write(&path, b"fake").unwrap();
        let config = extract_video_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.service, VideoService::LocalAudio);
    }

    #[test]
    fn test_extract_page_missing() {
        assert_eq!(extract_page("https://www.bilibili.com/video/BV1xx411c7mD"), None);
    }
}

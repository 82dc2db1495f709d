use std::path::{Path, PathBuf};

use eyre::{Result, bail};
use log::debug;

use crate::{Subtitles, VideoConfig, VideoService, bilibili, douyin, youtube};

/// Where the audio for a video can be read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// A page or media URL handed to yt-dlp
    Remote(String),
    /// A file on disk, transcribed directly
    Local(PathBuf),
}

/// Podcasts, meetings and local files carry no subtitle track. The
/// extractor only names the item so the audio fallback can take over.
pub fn fetch_subtitles(video: &VideoConfig) -> Subtitles {
    debug!("{} has no subtitle track, deferring to audio", video.service);
    let title = if video.service.is_local() {
        Path::new(&video.video_id)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| video.video_id.clone())
    } else {
        video.video_id.clone()
    };
    Subtitles {
        title,
        ..Default::default()
    }
}

/// Resolve the audio location for any service
pub fn audio_source(video: &VideoConfig) -> Result<AudioSource> {
    let id = video.video_id.as_str();
    let source = match video.service {
        VideoService::Bilibili => AudioSource::Remote(bilibili::page_url(id, video.page_number.as_deref())),
        VideoService::Youtube => AudioSource::Remote(youtube::watch_url(id)),
        VideoService::Douyin => AudioSource::Remote(douyin::video_url(id)),
        VideoService::Podcast | VideoService::Meeting => match video.video_url.as_deref() {
            Some(url) if url.starts_with("http") => AudioSource::Remote(url.to_string()),
            _ if id.starts_with("http") => AudioSource::Remote(id.to_string()),
            _ => bail!("无法确定 {} 的音频地址: {id}", video.service),
        },
        VideoService::LocalVideo | VideoService::LocalAudio => {
            let path = PathBuf::from(id);
            if !path.is_file() {
                bail!("本地文件不存在: {}", path.display());
            }
            AudioSource::Local(path)
        }
    };
    Ok(source)
}

/// Link recorded with a summary: the submitted URL when known, otherwise the
/// platform page or the local path
pub fn source_url(video: &VideoConfig) -> String {
    if let Some(url) = video.video_url.as_deref().filter(|u| !u.trim().is_empty()) {
        return url.to_string();
    }
    match audio_source(video) {
        Ok(AudioSource::Remote(url)) => url,
        _ => video.video_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_url() {
        let bili = VideoConfig {
            video_id: "BV1xx411c7mD".to_string(),
            page_number: Some("2".to_string()),
            ..Default::default()
        };
        assert_eq!(source_url(&bili), bilibili::page_url("BV1xx411c7mD", Some("2")));

        let submitted = video(VideoService::Youtube, "dQw4w9WgXcQ", Some("https://youtu.be/dQw4w9WgXcQ"));
        assert_eq!(source_url(&submitted), "https://youtu.be/dQw4w9WgXcQ");

        let missing = video(VideoService::LocalAudio, "/nope/a.mp3", None);
        assert_eq!(source_url(&missing), "/nope/a.mp3");
    }

    fn video(service: VideoService, id: &str, url: Option<&str>) -> VideoConfig {
        VideoConfig {
            video_id: id.to_string(),
            service,
            video_url: url.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_remote_sources() {
        let mut bili = video(VideoService::Bilibili, "BV1xx411c7mD", None);
        bili.page_number = Some("2".to_string());
        assert_eq!(
            audio_source(&bili).unwrap(),
            AudioSource::Remote("https://www.bilibili.com/video/BV1xx411c7mD?p=2".to_string())
        );

        let yt = video(VideoService::Youtube, "dQw4w9WgXcQ", None);
        assert_eq!(
            audio_source(&yt).unwrap(),
            AudioSource::Remote("https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string())
        );

        let pod = video(VideoService::Podcast, "123", Some("https://feeds.example.com/episode/123"));
        assert_eq!(
            audio_source(&pod).unwrap(),
            AudioSource::Remote("https://feeds.example.com/episode/123".to_string())
        );
    }

    #[test]
    fn test_meeting_without_url() {
        assert!(audio_source(&video(VideoService::Meeting, "abc", None)).is_err());
    }

    #[test]
    fn test_local_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lecture.mp3");
        std::fs::write(&path, b"ID3").unwrap();
        let id = path.to_string_lossy().to_string();

        let local = video(VideoService::LocalAudio, &id, None);
        assert_eq!(audio_source(&local).unwrap(), AudioSource::Local(path));
        assert_eq!(fetch_subtitles(&local).title, "lecture");

        let missing = video(VideoService::LocalVideo, "/nonexistent/a.mp4", None);
        assert!(audio_source(&missing).is_err());
    }

    #[test]
    fn test_placeholder_title_is_id() {
        let sub = fetch_subtitles(&video(VideoService::Podcast, "ep-42", None));
        assert_eq!(sub.title, "ep-42");
        assert!(sub.segments.is_empty());
    }
}

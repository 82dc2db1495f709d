use std::path::{Path, PathBuf};

use eyre::Result;
use log::debug;

use crate::{Transcript, VideoConfig};

fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("bibi")
        .join("transcripts")
}

/// `{service}-{id}[-p{page}]`, with path separators flattened for URL ids
pub fn cache_key(video: &VideoConfig) -> String {
    let id: String = video
        .video_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    match &video.page_number {
        Some(page) => format!("{}-{id}-p{page}", video.service),
        None => format!("{}-{id}", video.service),
    }
}

fn cache_path(dir: &Path, video: &VideoConfig) -> PathBuf {
    dir.join(format!("{}.json", cache_key(video)))
}

/// Load a cached transcript, if available.
pub fn load(video: &VideoConfig) -> Option<Transcript> {
    load_from(&cache_dir(), video)
}

/// Save a transcript to the cache.
pub fn save(video: &VideoConfig, transcript: &Transcript) -> Result<()> {
    save_to(&cache_dir(), video, transcript)
}

fn load_from(dir: &Path, video: &VideoConfig) -> Option<Transcript> {
    let path = cache_path(dir, video);
    let data = std::fs::read_to_string(&path).ok()?;
    let transcript: Transcript = serde_json::from_str(&data).ok()?;
    debug!("Cache hit: {}", path.display());
    Some(transcript)
}

fn save_to(dir: &Path, video: &VideoConfig, transcript: &Transcript) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = cache_path(dir, video);
    let data = serde_json::to_string_pretty(transcript)?;
    std::fs::write(&path, data)?;
    debug!("Cached transcript: {}", path.display());
    Ok(())
}

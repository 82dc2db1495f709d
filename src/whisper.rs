use std::path::{Path, PathBuf};
use std::process::Stdio;

use eyre::{Result, bail};
use log::debug;
use reqwest::multipart;
use tokio::process::Command;

use crate::Segment;
use crate::keys::ApiConfig;

/// Maximum file size for a single Whisper API upload (25 MB)
const MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;

/// Length of each ffmpeg chunk for oversized uploads
const CHUNK_SECS: u64 = 1200;

/// Whisper transcription model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WhisperModel {
    Gpt4oMiniTranscribe,
    Gpt4oTranscribe,
    #[default]
    Whisper1,
}

impl WhisperModel {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gpt-4o-mini-transcribe" => Some(WhisperModel::Gpt4oMiniTranscribe),
            "gpt-4o-transcribe" => Some(WhisperModel::Gpt4oTranscribe),
            "whisper-1" => Some(WhisperModel::Whisper1),
            _ => None,
        }
    }

    fn api_name(&self) -> &str {
        match self {
            WhisperModel::Gpt4oMiniTranscribe => "gpt-4o-mini-transcribe",
            WhisperModel::Gpt4oTranscribe => "gpt-4o-transcribe",
            WhisperModel::Whisper1 => "whisper-1",
        }
    }

    fn response_format(&self) -> &str {
        match self {
            WhisperModel::Whisper1 => "verbose_json",
            // Newer transcribe models only support "json" or "text"
            _ => "json",
        }
    }

    fn supports_timestamp_granularities(&self) -> bool {
        matches!(self, WhisperModel::Whisper1)
    }
}

/// Container format sniffed from the first bytes of an audio file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Webm,
}

impl AudioFormat {
    pub fn sniff(header: &[u8]) -> Option<Self> {
        if header.starts_with(b"ID3") || header.starts_with(&[0xff, 0xfb]) || header.starts_with(&[0xff, 0xf3]) {
            Some(AudioFormat::Mp3)
        } else if header.get(4..8) == Some(b"ftyp") {
            Some(AudioFormat::M4a)
        } else if header.starts_with(&[0x1a, 0x45, 0xdf, 0xa3]) {
            Some(AudioFormat::Webm)
        } else {
            None
        }
    }

    fn mime(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Webm => "audio/webm",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Webm => "webm",
        }
    }
}

/// Transcribe an audio file, splitting it with ffmpeg when it exceeds the
/// upload limit. Segment indices are renumbered across chunks.
pub async fn transcribe_audio(
    client: &reqwest::Client,
    api: &ApiConfig,
    audio_path: &Path,
    model: &WhisperModel,
    lang: &str,
) -> Result<Vec<Segment>> {
    let file_size = tokio::fs::metadata(audio_path).await?.len();
    debug!("Audio file size: {file_size} bytes");

    let mut segments = if file_size > MAX_UPLOAD_BYTES {
        transcribe_chunked(client, api, audio_path, model, lang, file_size).await?
    } else {
        transcribe_file(client, api, audio_path, model, lang).await?
    };

    for (i, seg) in segments.iter_mut().enumerate() {
        seg.index = i + 1;
    }
    Ok(segments)
}

async fn transcribe_file(
    client: &reqwest::Client,
    api: &ApiConfig,
    audio_path: &Path,
    model: &WhisperModel,
    lang: &str,
) -> Result<Vec<Segment>> {
    debug!("Uploading {} to Whisper API", audio_path.display());

    let file_bytes = tokio::fs::read(audio_path).await?;
    if file_bytes.is_empty() {
        bail!("audio file is empty: {}", audio_path.display());
    }

    let (file_name, mime) = match AudioFormat::sniff(&file_bytes) {
        Some(format) => (format!("audio.{}", format.extension()), format.mime()),
        None => {
            debug!("Unrecognized audio header, uploading as-is");
            let name = audio_path.file_name().unwrap_or_default().to_string_lossy().to_string();
            (name, "application/octet-stream")
        }
    };

    let file_part = multipart::Part::bytes(file_bytes).file_name(file_name).mime_str(mime)?;

    let mut form = multipart::Form::new()
        .part("file", file_part)
        .text("model", model.api_name().to_string())
        .text("language", lang.to_string())
        .text("response_format", model.response_format().to_string());

    if model.supports_timestamp_granularities() {
        form = form.text("timestamp_granularities[]", "segment");
    }

    let resp = client
        .post(format!("{}/audio/transcriptions", api.base_url))
        .bearer_auth(&api.api_key)
        .multipart(form)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!("Whisper API returned {status}: {body}");
    }

    let json: serde_json::Value = resp.json().await?;
    parse_whisper_response(&json)
}

fn parse_whisper_response(json: &serde_json::Value) -> Result<Vec<Segment>> {
    // verbose_json format has a "segments" array
    if let Some(segments) = json.get("segments").and_then(|s| s.as_array()) {
        return Ok(segments
            .iter()
            .filter_map(|seg| {
                let text = seg.get("text")?.as_str()?.trim().to_string();
                let start = seg.get("start")?.as_f64()?;
                let end = seg.get("end")?.as_f64()?;
                if text.is_empty() {
                    return None;
                }
                let mut segment = Segment::new(0, text, Some(start));
                segment.duration = Some(end - start);
                Some(segment)
            })
            .collect());
    }

    // Fallback: plain text response
    if let Some(text) = json.get("text").and_then(|t| t.as_str()) {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        return Ok(vec![Segment::new(0, text, None)]);
    }

    bail!("unexpected Whisper API response format");
}

/// Duration from the last segment's end, rounded up
pub fn transcribed_duration(segments: &[Segment]) -> Option<f64> {
    let last = segments.iter().rev().find(|s| s.start.is_some())?;
    Some((last.start? + last.duration.unwrap_or(0.0)).ceil())
}

async fn probe_duration(audio_path: &Path) -> Option<f64> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-show_entries", "format=duration", "-of", "default=nw=1:nk=1"])
        .arg(audio_path)
        .output()
        .await
        .ok()
        .filter(|o| o.status.success())?;
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

/// Chunks this small hold no audio, only container headers
const MIN_CHUNK_BYTES: u64 = 1024;

/// A chunk cut past the end of the audio, which happens when the duration
/// had to be estimated
fn is_empty_chunk(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() < MIN_CHUNK_BYTES).unwrap_or(true)
}

async fn transcribe_chunked(
    client: &reqwest::Client,
    api: &ApiConfig,
    audio_path: &Path,
    model: &WhisperModel,
    lang: &str,
    file_size: u64,
) -> Result<Vec<Segment>> {
    let duration = match probe_duration(audio_path).await {
        Some(d) => d,
        // assume 64kbps when ffprobe is unavailable
        None => file_size as f64 / (64_000.0 / 8.0),
    };
    let num_chunks = (duration / CHUNK_SECS as f64).ceil().max(1.0) as usize;
    debug!("Splitting {duration:.0}s of audio into {num_chunks} chunks of {CHUNK_SECS}s");

    let work_dir = tempfile::Builder::new().prefix("bibi-chunks-").tempdir()?;
    let extension = audio_path.extension().and_then(|e| e.to_str()).unwrap_or("mp3");
    let mut all_segments = Vec::new();

    for i in 0..num_chunks {
        let offset = (i as u64 * CHUNK_SECS) as f64;
        let chunk_path: PathBuf = work_dir.path().join(format!("chunk-{i}.{extension}"));

        let status = Command::new("ffmpeg")
            .args(["-y", "-i"])
            .arg(audio_path)
            .args(["-ss", &offset.to_string(), "-t", &CHUNK_SECS.to_string(), "-acodec", "copy"])
            .arg(&chunk_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(s) if s.success() => {}
            Ok(_) => bail!("ffmpeg failed to split audio at offset {offset}s"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                bail!("ffmpeg not found; it is required to transcribe audio larger than 25 MB")
            }
            Err(e) => bail!("failed to run ffmpeg: {e}"),
        }

        if is_empty_chunk(&chunk_path) {
            debug!("Chunk {i} at {offset}s is past the end of the audio, stopping");
            break;
        }

        let mut segments = transcribe_file(client, api, &chunk_path, model, lang).await?;
        for seg in &mut segments {
            seg.start = seg.start.map(|s| s + offset);
        }
        all_segments.extend(segments);
    }

    if all_segments.is_empty() {
        bail!("no audio could be transcribed from {}", audio_path.display());
    }
    Ok(all_segments)
}

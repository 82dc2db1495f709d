use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use eyre::{Result, bail};
use log::{debug, info, warn};
use tokio::process::Command;

pub const BINARY: &str = "yt-dlp";

const INFO_TIMEOUT: Duration = Duration::from_secs(30);
const SUBTITLE_TIMEOUT: Duration = Duration::from_secs(60);
const AUDIO_TIMEOUT: Duration = Duration::from_secs(180);

/// Browsers yt-dlp can read cookies from
const BROWSERS: &[&str] = &["chrome", "chromium", "edge", "firefox", "opera", "safari", "brave", "vivaldi"];

/// Subtitle languages in order of preference
const SUB_LANGS: &str = "zh,zh-Hans,zh-Hant,en";

/// Cookie source handed to yt-dlp
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Cookies {
    #[default]
    None,
    Browser(String),
    File(PathBuf),
    Sessdata(String),
}

impl Cookies {
    /// Browser name is validated; an unknown browser falls back to chrome
    pub fn from_browser(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        if BROWSERS.contains(&name.as_str()) {
            Cookies::Browser(name)
        } else {
            warn!("Unknown browser '{name}' for cookies, using chrome");
            Cookies::Browser("chrome".to_string())
        }
    }

    fn args(&self) -> Vec<String> {
        match self {
            Cookies::None => Vec::new(),
            Cookies::Browser(b) => vec!["--cookies-from-browser".into(), b.clone()],
            Cookies::File(path) => vec!["--cookies".into(), path.to_string_lossy().to_string()],
            Cookies::Sessdata(token) => vec!["--add-header".into(), format!("Cookie:SESSDATA={token}")],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoInfo {
    pub title: Option<String>,
    pub duration: Option<f64>,
}

/// Why a yt-dlp run failed, judged from its output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    MissingFfmpeg,
    LoginRequired,
    Unavailable,
    Network,
    Unknown,
}

impl FailureKind {
    pub fn hint(&self) -> &'static str {
        match self {
            FailureKind::MissingFfmpeg => {
                "提示: 需要安装 ffmpeg。Windows: 从 https://ffmpeg.org/download.html 下载；macOS: brew install ffmpeg；Linux: sudo apt install ffmpeg"
            }
            FailureKind::LoginRequired => {
                "提示: 视频可能需要登录。请配置 BILIBILI_SESSION_TOKEN 环境变量（从浏览器 Cookie 中获取 SESSDATA）"
            }
            FailureKind::Unavailable => "提示: 视频可能不存在或不可用",
            FailureKind::Network => "提示: 网络连接问题，请检查网络或稍后重试",
            FailureKind::Unknown => "提示: 请查看上面的详细错误信息以确定问题原因",
        }
    }
}

/// Judged on the `ERROR:` lines when there are any, since yt-dlp also logs
/// informational lines such as `[Cookies] Extracting cookies from chrome`
pub fn classify_failure(output: &str) -> FailureKind {
    let errors: Vec<&str> = output.lines().filter(|l| l.trim_start().starts_with("ERROR:")).collect();
    let lower = if errors.is_empty() {
        output.to_lowercase()
    } else {
        errors.join("\n").to_lowercase()
    };

    if lower.contains("ffmpeg") || lower.contains("ffprobe") {
        FailureKind::MissingFfmpeg
    } else if lower.contains("login") || lower.contains("private") || lower.contains("sessdata") {
        FailureKind::LoginRequired
    } else if lower.contains("unavailable") || lower.contains("not found") || lower.contains("404") {
        FailureKind::Unavailable
    } else if lower.contains("network") || lower.contains("connection") || lower.contains("timed out") {
        FailureKind::Network
    } else {
        FailureKind::Unknown
    }
}

/// Check whether yt-dlp is on PATH
pub async fn is_available() -> bool {
    Command::new(BINARY)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

async fn run(args: &[String], limit: Duration) -> Result<Output> {
    debug!("Running {BINARY} {}", args.join(" "));

    let child = Command::new(BINARY)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            bail!(
                "yt-dlp not found. Install it to enable audio transcription:\n  \
                 pip install yt-dlp\n  \
                 or: brew install yt-dlp"
            );
        }
        Err(e) => bail!("failed to run yt-dlp: {e}"),
    };

    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        Err(_) => bail!("yt-dlp timed out after {}s", limit.as_secs()),
    }
}

fn combined_output(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    format!("{}\n{}", stderr.trim(), stdout.trim()).trim().to_string()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Title and duration of a video
pub async fn video_info(url: &str, cookies: &Cookies) -> Result<VideoInfo> {
    let mut args = cookies.args();
    args.extend(["--get-title", "--get-duration", "--no-playlist", url].map(String::from));

    let output = run(&args, INFO_TIMEOUT).await?;
    if !output.status.success() {
        bail!("yt-dlp info failed: {}", truncate(&combined_output(&output), 500));
    }
    Ok(parse_info_output(&String::from_utf8_lossy(&output.stdout)))
}

/// `--get-title --get-duration` prints the title then the duration
pub fn parse_info_output(stdout: &str) -> VideoInfo {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    let title = lines.next().map(String::from);
    let duration = lines.next().and_then(parse_duration);
    VideoInfo { title, duration }
}

/// `HH:MM:SS`, `MM:SS` or plain seconds
pub fn parse_duration(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    match parts.as_slice() {
        [h, m, sec] => Some(h.parse::<f64>().ok()? * 3600.0 + m.parse::<f64>().ok()? * 60.0 + sec.parse::<f64>().ok()?),
        [m, sec] => Some(m.parse::<f64>().ok()? * 60.0 + sec.parse::<f64>().ok()?),
        [sec] => sec.parse::<f64>().ok(),
        _ => None,
    }
}

/// Download subtitle tracks into `dir`; `None` when the video has none
pub async fn download_subtitles(url: &str, dir: &Path) -> Result<Option<PathBuf>> {
    let template = dir.join("subtitle.%(ext)s").to_string_lossy().to_string();
    let args: Vec<String> = [
        "--write-subs",
        "--write-auto-subs",
        "--sub-lang",
        SUB_LANGS,
        "--skip-download",
        "--sub-format",
        "vtt/best",
        "--output",
        template.as_str(),
        "--no-playlist",
        url,
    ]
    .map(String::from)
    .to_vec();

    let output = run(&args, SUBTITLE_TIMEOUT).await?;
    if !output.status.success() {
        let text = combined_output(&output);
        if is_no_subtitles(&text) {
            debug!("yt-dlp reports no subtitles for {url}");
            return Ok(None);
        }
        bail!("yt-dlp subtitle download failed: {}", truncate(&text, 500));
    }

    let files: Vec<String> = std::fs::read_dir(dir)?
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();

    Ok(select_subtitle_file(&files).map(|f| dir.join(f)))
}

fn is_no_subtitles(output: &str) -> bool {
    output.contains("subtitles not available") || output.contains("No subtitles") || output.contains("没有字幕")
}

/// Chinese tracks first, then English, then whatever exists
pub fn select_subtitle_file(files: &[String]) -> Option<&String> {
    let candidates: Vec<&String> = files
        .iter()
        .filter(|f| f.contains("subtitle") && (f.ends_with(".vtt") || f.ends_with(".srt") || f.ends_with(".json3") || f.ends_with(".json")))
        .collect();

    candidates
        .iter()
        .find(|f| f.contains(".zh"))
        .or_else(|| candidates.iter().find(|f| f.contains(".en")))
        .or_else(|| candidates.first())
        .copied()
}

/// Download audio into `dir`, trying progressively heavier strategies
pub async fn download_audio(url: &str, dir: &Path, cookies: &Cookies) -> Result<PathBuf> {
    let template = dir.join("audio.%(ext)s").to_string_lossy().to_string();
    let strategies: [(&str, &[&str]); 3] = [
        ("best audio", &["-f", "bestaudio"]),
        (
            "audio by container",
            &["-f", "bestaudio[ext=m4a]/bestaudio[ext=mp3]/bestaudio[ext=webm]/bestaudio"],
        ),
        ("extract to mp3", &["-x", "--audio-format", "mp3", "--audio-quality", "0"]),
    ];

    let mut failures = Vec::new();
    for (label, flags) in strategies {
        let mut args = cookies.args();
        args.extend(flags.iter().map(|s| s.to_string()));
        args.extend(["-o", template.as_str(), "--no-playlist", url].map(String::from));

        debug!("Downloading audio ({label}): {url}");
        let text = match run(&args, AUDIO_TIMEOUT).await {
            Ok(output) if output.status.success() => match find_audio_file(dir)? {
                Some(path) => {
                    info!("Audio downloaded via '{label}': {}", path.display());
                    return Ok(path);
                }
                None => "yt-dlp succeeded but produced no audio file".to_string(),
            },
            Ok(output) => combined_output(&output),
            Err(e) => e.to_string(),
        };
        warn!("Audio strategy '{label}' failed: {}", truncate(&text, 300));
        failures.push((label, text));
    }

    let last = failures.last().map(|(_, t)| t.as_str()).unwrap_or_default();
    let kind = classify_failure(last);
    let report = failures
        .iter()
        .enumerate()
        .map(|(i, (label, text))| format!("strategy {} ({label}): {}", i + 1, truncate(text, 1000)))
        .collect::<Vec<_>>()
        .join("\n\n");
    bail!("audio download failed after {} strategies\n\n{report}\n\n{}", failures.len(), kind.hint());
}

fn find_audio_file(dir: &Path) -> Result<Option<PathBuf>> {
    for entry in std::fs::read_dir(dir)?.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with("audio.") || name.ends_with(".part") || name.ends_with(".ytdl") {
            continue;
        }
        let path = entry.path();
        if std::fs::metadata(&path)?.len() == 0 {
            bail!("downloaded audio file is empty: {}", path.display());
        }
        return Ok(Some(path));
    }
    Ok(None)
}

use std::path::Path;
use std::time::Duration;

use eyre::{Result, bail, eyre};
use log::{debug, info, warn};
use serde_json::Value;
use tokio::process::Command;

use crate::config::DouyinConfig;
use crate::{Subtitles, ytdlp};

const API_TIMEOUT: Duration = Duration::from_secs(30);
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// What the HTTP API or helper script knows about a video
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DouyinInfo {
    pub title: String,
    pub duration: Option<f64>,
    pub video_url: Option<String>,
    pub audio_url: Option<String>,
}

/// Short links are kept whole as the id
pub fn video_url(video_id: &str) -> String {
    if video_id.contains("http") {
        video_id.to_string()
    } else {
        format!("https://www.douyin.com/video/{video_id}")
    }
}

/// Browser cookies win over a cookies file; with neither, try chrome
pub fn cookies(config: &DouyinConfig) -> ytdlp::Cookies {
    if let Some(browser) = &config.cookies_from_browser {
        ytdlp::Cookies::from_browser(browser)
    } else if let Some(file) = &config.cookies_file {
        ytdlp::Cookies::File(file.clone())
    } else {
        ytdlp::Cookies::Browser("chrome".to_string())
    }
}

/// Douyin has no subtitle tracks, so this only resolves title and duration.
/// Every lookup failing still yields the id as title.
pub async fn fetch_subtitles(client: &reqwest::Client, video_id: &str, config: &DouyinConfig) -> Subtitles {
    let url = video_url(video_id);
    debug!("Resolving douyin video: {url}");

    if ytdlp::is_available().await {
        match ytdlp::video_info(&url, &cookies(config)).await {
            Ok(found) => {
                info!("Got douyin video info from yt-dlp");
                return Subtitles {
                    title: found.title.unwrap_or_else(|| video_id.to_string()),
                    duration: found.duration,
                    ..Default::default()
                };
            }
            Err(e) => warn!("yt-dlp could not read douyin video info: {e}"),
        }
    } else {
        debug!("yt-dlp not installed, trying the douyin API");
    }

    if config.api_enabled() {
        match fetch_with_api(client, &url, config).await {
            Ok(found) => {
                return Subtitles {
                    title: found.title,
                    duration: found.duration,
                    ..Default::default()
                };
            }
            Err(e) => warn!("Douyin API fallback failed: {e}"),
        }
    }

    Subtitles::empty(video_id)
}

/// HTTP API first when configured, then the local helper script
pub async fn fetch_with_api(client: &reqwest::Client, url: &str, config: &DouyinConfig) -> Result<DouyinInfo> {
    if let Some(base) = &config.api_base_url {
        match fetch_via_http(client, base, url).await {
            Ok(found) => return Ok(found),
            Err(e) => warn!("Douyin HTTP API failed, trying python script: {e}"),
        }
    }

    let script = config.python_script();
    if !script.exists() {
        bail!(
            "Douyin API unavailable: set DOUYIN_API_BASE_URL or provide the script at {}",
            script.display()
        );
    }
    fetch_via_script(&script, url).await
}

async fn fetch_via_http(client: &reqwest::Client, base: &str, url: &str) -> Result<DouyinInfo> {
    let endpoint = format!("{}/api/douyin/web", base.trim_end_matches('/'));
    debug!("Calling douyin API: {endpoint}");

    let resp = client
        .post(&endpoint)
        .json(&serde_json::json!({ "url": url }))
        .timeout(API_TIMEOUT)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let body: String = body.chars().take(200).collect();
        bail!("API request failed ({status}): {body}");
    }

    let json: Value = resp.json().await?;
    Ok(parse_info(&json, url))
}

async fn python_command() -> Result<&'static str> {
    for cmd in ["python3", "python"] {
        let ok = Command::new(cmd)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);
        if ok {
            return Ok(cmd);
        }
    }
    bail!("python is not installed")
}

async fn fetch_via_script(script: &Path, url: &str) -> Result<DouyinInfo> {
    let python = python_command().await?;
    debug!("Running {python} {} {url}", script.display());

    let mut cmd = Command::new(python);
    cmd.arg(script).arg(url).kill_on_drop(true);
    let output = tokio::time::timeout(SCRIPT_TIMEOUT, cmd.output())
        .await
        .map_err(|_| eyre!("python script timed out after {}s", SCRIPT_TIMEOUT.as_secs()))??;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    if stdout.is_empty() {
        bail!("python script returned no data");
    }
    let json: Value = serde_json::from_str(stdout)?;
    if let Some(err) = json.get("error").and_then(Value::as_str) {
        bail!("python script failed: {err}");
    }
    Ok(parse_info(&json, url))
}

/// Fields may sit at the top level or under `data`; numbers may be strings
fn parse_info(json: &Value, url: &str) -> DouyinInfo {
    let field = |name: &str| {
        json.get("data")
            .and_then(|d| d.get(name))
            .filter(|v| !v.is_null())
            .or_else(|| json.get(name))
            .filter(|v| !v.is_null())
    };
    let text = |name: &str| {
        field(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    DouyinInfo {
        title: text("title").unwrap_or_else(|| url.to_string()),
        duration: field("duration").and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }),
        video_url: text("video_url"),
        audio_url: text("audio_url"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_video_url() {
        assert_eq!(video_url("7234567890123456789"), "https://www.douyin.com/video/7234567890123456789");
        assert_eq!(video_url("https://v.douyin.com/iRNBho6/"), "https://v.douyin.com/iRNBho6/");
    }

    #[test]
    fn test_cookie_priority() {
        let config = DouyinConfig {
            cookies_from_browser: Some("Firefox".to_string()),
            cookies_file: Some(PathBuf::from("/tmp/c.txt")),
            ..Default::default()
        };
        assert_eq!(cookies(&config), ytdlp::Cookies::Browser("firefox".to_string()));

        let config = DouyinConfig {
            cookies_file: Some(PathBuf::from("/tmp/c.txt")),
            ..Default::default()
        };
        assert_eq!(cookies(&config), ytdlp::Cookies::File(PathBuf::from("/tmp/c.txt")));

        assert_eq!(cookies(&DouyinConfig::default()), ytdlp::Cookies::Browser("chrome".to_string()));
    }

    #[test]
    fn test_parse_info_nested() {
        let json = serde_json::json!({
            "code": 200,
            "data": {"title": "跳舞", "duration": "15.5", "video_url": "https://v/1.mp4"}
        });
        let found = parse_info(&json, "https://www.douyin.com/video/1");
        assert_eq!(found.title, "跳舞");
        assert_eq!(found.duration, Some(15.5));
        assert_eq!(found.video_url.as_deref(), Some("https://v/1.mp4"));
        assert!(found.audio_url.is_none());
    }

    #[test]
    fn test_parse_info_flat_and_missing_title() {
        let json = serde_json::json!({"duration": 42, "audio_url": "https://a/1.mp3"});
        let found = parse_info(&json, "https://www.douyin.com/video/1");
        assert_eq!(found.title, "https://www.douyin.com/video/1");
        assert_eq!(found.duration, Some(42.0));
        assert_eq!(found.audio_url.as_deref(), Some("https://a/1.mp3"));
    }

    #[tokio::test]
    async fn test_missing_script_without_api() {
        let config = DouyinConfig {
            python_script: Some(PathBuf::from("/nonexistent/douyin_fetch.py")),
            ..Default::default()
        };
        let client = reqwest::Client::new();
        let err = fetch_with_api(&client, "https://www.douyin.com/video/1", &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("DOUYIN_API_BASE_URL"));
    }
}

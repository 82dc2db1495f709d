use eyre::{Result, bail, eyre};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::subtitle::parse_subtitle;
use crate::{Segment, Subtitles};

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36";

const API_BASE: &str = "https://api.bilibili.com";

/// Subtitle languages in order of preference
const PREFERRED_LANGS: &[&str] = &["zh-CN", "ai-zh"];

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoView {
    pub aid: Option<u64>,
    #[serde(default)]
    pub title: String,
    pub desc: Option<String>,
    pub duration: Option<f64>,
    #[serde(default)]
    pub pages: Vec<VideoPage>,
    pub subtitle: Option<SubtitleList>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoPage {
    pub cid: u64,
    pub page: u32,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubtitleList {
    #[serde(default, alias = "subtitles")]
    pub list: Vec<SubtitleTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubtitleTrack {
    pub lan: String,
    pub subtitle_url: String,
}

#[derive(Debug, Deserialize)]
struct PlayerData {
    subtitle: Option<SubtitleList>,
}

/// Title, duration and subtitle tracks for one page of a video
#[derive(Debug, Clone, Default)]
pub struct VideoInfo {
    pub title: String,
    pub description: Option<String>,
    pub duration: Option<f64>,
    pub tracks: Vec<SubtitleTrack>,
}

pub fn page_url(video_id: &str, page: Option<&str>) -> String {
    match page {
        Some(p) => format!("https://www.bilibili.com/video/{video_id}?p={p}"),
        None => format!("https://www.bilibili.com/video/{video_id}"),
    }
}

fn view_query(video_id: &str) -> (&'static str, &str) {
    match video_id.strip_prefix("av") {
        Some(aid) => ("aid", aid),
        None => ("bvid", video_id),
    }
}

fn request(client: &reqwest::Client, url: &str, sessdata: Option<&String>) -> reqwest::RequestBuilder {
    let mut req = client
        .get(url)
        .header("Accept", "application/json")
        .header("User-Agent", USER_AGENT)
        .header("Host", "api.bilibili.com");
    if let Some(token) = sessdata {
        req = req.header("Cookie", format!("SESSDATA={token}"));
    }
    req
}

fn unwrap_api<T>(resp: ApiResponse<T>, what: &str) -> Result<T> {
    if resp.code != 0 {
        bail!("bilibili {what} returned code {}: {}", resp.code, resp.message);
    }
    resp.data.ok_or_else(|| eyre!("bilibili {what} returned no data"))
}

/// Page to use for a multi-part video; unknown page numbers fall back to the first
fn select_page<'a>(pages: &'a [VideoPage], page_number: Option<&str>) -> Option<&'a VideoPage> {
    let wanted: u32 = page_number.and_then(|p| p.parse().ok()).unwrap_or(1);
    pages.iter().find(|p| p.page == wanted).or_else(|| pages.first())
}

pub async fn fetch_video_info(
    client: &reqwest::Client,
    video_id: &str,
    page_number: Option<&str>,
    sessdata: &[String],
) -> Result<VideoInfo> {
    let token = sessdata.choose(&mut rand::thread_rng());
    let (param, value) = view_query(video_id);
    let url = format!("{API_BASE}/x/web-interface/view?{param}={value}");
    debug!("Fetching bilibili view: {url}");

    let resp: ApiResponse<VideoView> = request(client, &url, token).send().await?.json().await?;
    let view = unwrap_api(resp, "view")?;

    let mut info = VideoInfo {
        title: view.title.clone(),
        description: view.desc.clone().filter(|d| !d.trim().is_empty() && d != "-"),
        duration: view.pages.first().and_then(|p| p.duration).or(view.duration),
        tracks: view.subtitle.clone().unwrap_or_default().list,
    };

    if let (Some(aid), Some(page)) = (view.aid, select_page(&view.pages, page_number)) {
        info.duration = page.duration.or(info.duration);
        let url = format!("{API_BASE}/x/player/v2?aid={aid}&cid={}", page.cid);
        debug!("Fetching bilibili player: {url}");

        let resp: ApiResponse<PlayerData> = request(client, &url, token).send().await?.json().await?;
        info.tracks = unwrap_api(resp, "player")?.subtitle.unwrap_or_default().list;
    }

    Ok(info)
}

/// Preferred subtitle track: zh-CN, then AI-generated Chinese, then the first
pub fn select_track(tracks: &[SubtitleTrack]) -> Option<&SubtitleTrack> {
    PREFERRED_LANGS
        .iter()
        .find_map(|lang| tracks.iter().find(|t| t.lan == *lang))
        .or_else(|| tracks.first())
}

fn absolute_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("https://{rest}")
    } else {
        url.to_string()
    }
}

pub async fn fetch_subtitles(
    client: &reqwest::Client,
    video_id: &str,
    page_number: Option<&str>,
    sessdata: &[String],
) -> Result<Subtitles> {
    let info = fetch_video_info(client, video_id, page_number, sessdata).await?;
    info!("Bilibili video: {} ({} subtitle tracks)", info.title, info.tracks.len());

    let mut subtitles = Subtitles {
        title: if info.title.is_empty() { video_id.to_string() } else { info.title.clone() },
        segments: Vec::new(),
        description: info.description.clone(),
        duration: info.duration,
    };

    let Some(track) = select_track(&info.tracks) else {
        debug!("No subtitle tracks for {video_id}");
        return Ok(subtitles);
    };

    let url = absolute_url(&track.subtitle_url);
    debug!("Downloading {} subtitle: {url}", track.lan);
    match client.get(&url).header("User-Agent", USER_AGENT).send().await {
        Ok(resp) => {
            let body = resp.error_for_status()?.text().await?;
            subtitles.segments = parse_body(&body);
        }
        Err(e) => warn!("Failed to download bilibili subtitle: {e}"),
    }
    Ok(subtitles)
}

fn parse_body(body: &str) -> Vec<Segment> {
    parse_subtitle(body, Some("json"))
}

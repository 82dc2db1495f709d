//! JSON documents for history, templates and preferences under the data dir.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Segment, SummarySettings};

pub const MAX_HISTORY: usize = 50;

const HISTORY_FILE: &str = "history.json";
const TEMPLATES_FILE: &str = "templates.json";
const PREFERENCES_FILE: &str = "preferences.json";

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoHistory {
    pub id: String,
    pub video_id: String,
    pub video_url: String,
    pub title: String,
    pub summary: String,
    pub timestamp: i64,
    pub video_service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitles_array: Option<Vec<Segment>>,
}

/// A history entry before it is stamped with an id and time
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVideoHistory {
    pub video_id: String,
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub video_service: String,
    #[serde(default)]
    pub subtitles_array: Option<Vec<Segment>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTemplate {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub prompt_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<SummarySettings>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

impl SummaryTemplate {
    pub fn is_default(&self) -> bool {
        self.is_default.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTemplate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prompt_template: String,
    #[serde(default)]
    pub config: Option<SummarySettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub prompt_template: Option<String>,
    pub config: Option<SummarySettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    pub default_detail_level: u32,
    pub default_sentence_number: u32,
    pub default_outline_level: u32,
    pub default_output_language: String,
    pub default_show_timestamp: bool,
    pub default_show_emoji: bool,
    pub default_enable_stream: bool,
    /// Serialized settings → number of summaries run with them
    pub config_usage_count: BTreeMap<String, u64>,
    pub last_updated: i64,
}

impl Default for UserPreferences {
    fn default() -> Self {
        UserPreferences {
            default_detail_level: 600,
            default_sentence_number: 5,
            default_outline_level: 1,
            default_output_language: "中文".to_string(),
            default_show_timestamp: false,
            default_show_emoji: true,
            default_enable_stream: true,
            config_usage_count: BTreeMap::new(),
            last_updated: now_millis(),
        }
    }
}

impl UserPreferences {
    /// Settings to start from when the caller sends none
    pub fn default_settings(&self) -> SummarySettings {
        SummarySettings {
            detail_level: Some(self.default_detail_level),
            sentence_number: Some(self.default_sentence_number),
            outline_level: Some(self.default_outline_level),
            output_language: Some(self.default_output_language.clone()),
            show_timestamp: Some(self.default_show_timestamp),
            show_emoji: Some(self.default_show_emoji),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    pub default_detail_level: Option<u32>,
    pub default_sentence_number: Option<u32>,
    pub default_outline_level: Option<u32>,
    pub default_output_language: Option<String>,
    pub default_show_timestamp: Option<bool>,
    pub default_show_emoji: Option<bool>,
    pub default_enable_stream: Option<bool>,
}

pub fn default_templates() -> Vec<SummaryTemplate> {
    let now = now_millis();
    vec![
        SummaryTemplate {
            id: "default".to_string(),
            name: "默认模板".to_string(),
            description: Some("系统默认的总结模板".to_string()),
            prompt_template: String::new(),
            config: None,
            created_at: now,
            updated_at: now,
            is_default: Some(true),
        },
        SummaryTemplate {
            id: "detailed".to_string(),
            name: "详细总结".to_string(),
            description: Some("生成详细的视频总结，包含更多细节".to_string()),
            prompt_template: "请生成一份详细的视频总结，包含以下内容：\n1. 完整的摘要（3-5句话）\n2. 详细的亮点（8-10个）\n3. 深入的思考（5-7个问题）\n4. 术语解释（5-7个）".to_string(),
            config: Some(SummarySettings {
                detail_level: Some(800),
                sentence_number: Some(8),
                outline_level: Some(2),
                output_language: Some("中文".to_string()),
                show_timestamp: Some(true),
                show_emoji: Some(true),
            }),
            created_at: now,
            updated_at: now,
            is_default: None,
        },
        SummaryTemplate {
            id: "brief".to_string(),
            name: "简洁总结".to_string(),
            description: Some("生成简洁的视频总结，快速了解要点".to_string()),
            prompt_template: "请生成一份简洁的视频总结，包含以下内容：\n1. 简要摘要（2-3句话）\n2. 核心亮点（3-5个）\n3. 关键思考（2-3个问题）".to_string(),
            config: Some(SummarySettings {
                detail_level: Some(400),
                sentence_number: Some(3),
                outline_level: Some(1),
                output_language: Some("中文".to_string()),
                show_timestamp: Some(false),
                show_emoji: Some(true),
            }),
            created_at: now,
            updated_at: now,
            is_default: None,
        },
    ]
}

/// File-backed record store
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Store { dir: dir.into() }
    }

    /// `~/.local/share/bibi` (or the platform equivalent)
    pub fn open_default() -> Self {
        Store::new(default_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T: DeserializeOwned>(&self, file: &str) -> Option<T> {
        let path = self.dir.join(file);
        let data = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring unreadable {}: {e}", path.display());
                None
            }
        }
    }

    fn write<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file);
        std::fs::write(&path, serde_json::to_string_pretty(value)?)?;
        debug!("Saved {}", path.display());
        Ok(())
    }

    // history

    pub fn history(&self) -> Vec<VideoHistory> {
        self.read(HISTORY_FILE).unwrap_or_default()
    }

    /// Newest first; an earlier entry for the same video is replaced
    pub fn add_history(&self, entry: NewVideoHistory) -> Result<VideoHistory> {
        let record = VideoHistory {
            id: new_id(),
            video_id: entry.video_id,
            video_url: entry.video_url,
            title: entry.title,
            summary: entry.summary,
            timestamp: now_millis(),
            video_service: entry.video_service,
            subtitles_array: entry.subtitles_array,
        };
        let mut history: Vec<VideoHistory> = self
            .history()
            .into_iter()
            .filter(|h| h.video_id != record.video_id)
            .collect();
        history.insert(0, record.clone());
        history.truncate(MAX_HISTORY);
        self.write(HISTORY_FILE, &history)?;
        Ok(record)
    }

    /// Returns whether anything was removed
    pub fn remove_history(&self, id: &str) -> Result<bool> {
        let mut history = self.history();
        let before = history.len();
        history.retain(|h| h.id != id);
        if history.len() == before {
            return Ok(false);
        }
        self.write(HISTORY_FILE, &history)?;
        Ok(true)
    }

    pub fn clear_history(&self) -> Result<()> {
        self.write(HISTORY_FILE, &Vec::<VideoHistory>::new())
    }

    pub fn find_history(&self, video_id: &str) -> Option<VideoHistory> {
        self.history().into_iter().find(|h| h.video_id == video_id)
    }

    // templates

    pub fn templates(&self) -> Vec<SummaryTemplate> {
        self.read(TEMPLATES_FILE).unwrap_or_else(default_templates)
    }

    pub fn template(&self, id: &str) -> Option<SummaryTemplate> {
        self.templates().into_iter().find(|t| t.id == id)
    }

    pub fn default_template(&self) -> SummaryTemplate {
        self.templates()
            .into_iter()
            .find(|t| t.is_default())
            .unwrap_or_else(|| default_templates().swap_remove(0))
    }

    pub fn add_template(&self, template: NewTemplate) -> Result<SummaryTemplate> {
        let now = now_millis();
        let record = SummaryTemplate {
            id: new_id(),
            name: template.name,
            description: template.description,
            prompt_template: template.prompt_template,
            config: template.config,
            created_at: now,
            updated_at: now,
            is_default: None,
        };
        let mut templates = self.templates();
        templates.push(record.clone());
        self.write(TEMPLATES_FILE, &templates)?;
        Ok(record)
    }

    pub fn update_template(&self, id: &str, update: TemplateUpdate) -> Result<SummaryTemplate> {
        let mut templates = self.templates();
        let template = templates
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| eyre!("template not found: {id}"))?;

        if let Some(name) = update.name {
            template.name = name;
        }
        if let Some(description) = update.description {
            template.description = Some(description);
        }
        if let Some(prompt) = update.prompt_template {
            template.prompt_template = prompt;
        }
        if let Some(config) = update.config {
            template.config = Some(config);
        }
        // strictly increasing even within the same millisecond
        template.updated_at = now_millis().max(template.updated_at + 1);

        let updated = template.clone();
        self.write(TEMPLATES_FILE, &templates)?;
        Ok(updated)
    }

    /// The default template is never deleted. Returns whether anything was removed.
    pub fn delete_template(&self, id: &str) -> Result<bool> {
        let mut templates = self.templates();
        let before = templates.len();
        templates.retain(|t| t.id != id || t.is_default());
        if templates.len() == before {
            return Ok(false);
        }
        self.write(TEMPLATES_FILE, &templates)?;
        Ok(true)
    }

    // preferences

    pub fn preferences(&self) -> UserPreferences {
        self.read(PREFERENCES_FILE).unwrap_or_default()
    }

    pub fn update_preferences(&self, update: PreferencesUpdate) -> Result<UserPreferences> {
        let mut prefs = self.preferences();
        if let Some(v) = update.default_detail_level {
            prefs.default_detail_level = v;
        }
        if let Some(v) = update.default_sentence_number {
            prefs.default_sentence_number = v;
        }
        if let Some(v) = update.default_outline_level {
            prefs.default_outline_level = v;
        }
        if let Some(v) = update.default_output_language {
            prefs.default_output_language = v;
        }
        if let Some(v) = update.default_show_timestamp {
            prefs.default_show_timestamp = v;
        }
        if let Some(v) = update.default_show_emoji {
            prefs.default_show_emoji = v;
        }
        if let Some(v) = update.default_enable_stream {
            prefs.default_enable_stream = v;
        }
        prefs.last_updated = now_millis();
        self.write(PREFERENCES_FILE, &prefs)?;
        Ok(prefs)
    }

    pub fn record_config_usage(&self, settings: &SummarySettings) -> Result<UserPreferences> {
        let key = serde_json::to_string(settings)?;
        let mut prefs = self.preferences();
        *prefs.config_usage_count.entry(key).or_insert(0) += 1;
        prefs.last_updated = now_millis();
        self.write(PREFERENCES_FILE, &prefs)?;
        Ok(prefs)
    }

    /// Settings used most often; ties go to the first key in order
    pub fn most_used_config(&self) -> Option<SummarySettings> {
        let prefs = self.preferences();
        let mut best: Option<(&String, u64)> = None;
        for (key, count) in &prefs.config_usage_count {
            if best.is_none_or(|(_, c)| *count > c) {
                best = Some((key, *count));
            }
        }
        best.and_then(|(key, _)| serde_json::from_str(key).ok())
    }

    pub fn reset_preferences(&self) -> Result<UserPreferences> {
        let prefs = UserPreferences::default();
        self.write(PREFERENCES_FILE, &prefs)?;
        Ok(prefs)
    }
}

pub fn default_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("bibi")
}

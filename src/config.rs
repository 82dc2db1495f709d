use std::path::PathBuf;

use eyre::Result;
use log::debug;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub port: Option<u16>,
    pub default_model: Option<String>,
    pub whisper_model: Option<String>,
    pub whisper_language: Option<String>,
    pub openai_api_keys: Vec<String>,
    pub openai_base_url: Option<String>,
    pub bilibili_sessdata: Vec<String>,
    pub enable_audio_transcription: Option<bool>,
    pub douyin: DouyinConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DouyinConfig {
    pub cookies_from_browser: Option<String>,
    pub cookies_file: Option<PathBuf>,
    pub api_base_url: Option<String>,
    pub api_enabled: Option<bool>,
    pub python_script: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EmailConfig {
    /// resend, sendgrid or smtp
    pub service: Option<String>,
    pub from: Option<String>,
    pub resend_api_key: Option<String>,
    pub sendgrid_api_key: Option<String>,
    pub smtp_host: Option<String>,
}

impl Config {
    /// Load config from ~/.config/bibi/config.toml if it exists
    pub fn load() -> Result<Self> {
        let path = config_path();
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            debug!("No config file found at {}", path.display());
            Ok(Config::default())
        }
    }

    /// Overlay deployment settings from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let flag = |key: &str| get(key).map(|v| v != "false" && v != "0");

        if let Some(keys) = get("OPENAI_API_KEY") {
            self.openai_api_keys = split_list(&keys);
        }
        if let Some(url) = get("OPENAI_API_BASE_URL") {
            self.openai_base_url = Some(url);
        }
        if let Some(tokens) = get("BILIBILI_SESSION_TOKEN") {
            self.bilibili_sessdata = split_list(&tokens);
        }
        if let Some(enabled) = flag("ENABLE_AUDIO_TRANSCRIPTION") {
            self.enable_audio_transcription = Some(enabled);
        }
        if let Some(port) = get("BIBI_PORT").and_then(|p| p.parse().ok()) {
            self.port = Some(port);
        }

        if let Some(browser) = get("DOUYIN_COOKIES_FROM_BROWSER") {
            self.douyin.cookies_from_browser = Some(browser);
        }
        if let Some(file) = get("DOUYIN_COOKIES_FILE") {
            self.douyin.cookies_file = Some(PathBuf::from(file));
        }
        if let Some(url) = get("DOUYIN_API_BASE_URL") {
            self.douyin.api_base_url = Some(url);
        }
        if let Some(enabled) = flag("DOUYIN_API_ENABLED") {
            self.douyin.api_enabled = Some(enabled);
        }
        if let Some(script) = get("DOUYIN_PYTHON_SCRIPT_PATH") {
            self.douyin.python_script = Some(PathBuf::from(script));
        }

        if let Some(service) = get("EMAIL_SERVICE") {
            self.email.service = Some(service.to_lowercase());
        }
        if let Some(from) = get("EMAIL_FROM") {
            self.email.from = Some(from);
        }
        if let Some(key) = get("RESEND_API_KEY") {
            self.email.resend_api_key = Some(key);
        }
        if let Some(key) = get("SENDGRID_API_KEY") {
            self.email.sendgrid_api_key = Some(key);
        }
        if let Some(host) = get("SMTP_HOST") {
            self.email.smtp_host = Some(host);
        }
    }

    pub fn model(&self) -> &str {
        self.default_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn openai_base_url(&self) -> &str {
        self.openai_base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn audio_transcription_enabled(&self) -> bool {
        self.enable_audio_transcription.unwrap_or(true)
    }

    pub fn whisper_language(&self) -> &str {
        self.whisper_language.as_deref().unwrap_or("zh")
    }
}

impl DouyinConfig {
    pub fn api_enabled(&self) -> bool {
        self.api_enabled.unwrap_or(true)
    }

    pub fn python_script(&self) -> PathBuf {
        self.python_script
            .clone()
            .unwrap_or_else(|| PathBuf::from("scripts/douyin_fetch.py"))
    }
}

/// Comma-separated list, trimmed, empties dropped
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("bibi")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
port = 8080
default_model = "gpt-4o"
whisper_model = "gpt-4o-transcribe"
openai_api_keys = ["sk-a", "sk-b"]
bilibili_sessdata = ["abc"]
enable_audio_transcription = false

[douyin]
cookies_from_browser = "firefox"
api_base_url = "http://localhost:8000"

[email]
service = "resend"
resend_api_key = "re_123"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port(), 8080);
        assert_eq!(config.model(), "gpt-4o");
        assert_eq!(config.openai_api_keys.len(), 2);
        assert!(!config.audio_transcription_enabled());
        assert_eq!(config.douyin.cookies_from_browser.as_deref(), Some("firefox"));
        assert_eq!(config.email.service.as_deref(), Some("resend"));
    }

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.model(), DEFAULT_MODEL);
        assert_eq!(config.port(), DEFAULT_PORT);
        assert!(config.audio_transcription_enabled());
        assert!(config.douyin.api_enabled());
        assert_eq!(config.whisper_language(), "zh");
        assert_eq!(config.openai_base_url(), DEFAULT_OPENAI_BASE_URL);
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-one, sk-two ,,"),
            ("OPENAI_API_BASE_URL", "https://proxy.example.com/v1/"),
            ("ENABLE_AUDIO_TRANSCRIPTION", "false"),
            ("DOUYIN_API_ENABLED", "false"),
            ("EMAIL_SERVICE", "SendGrid"),
            ("BIBI_PORT", "not-a-port"),
        ]);
        let mut config = Config {
            openai_api_keys: vec!["sk-file".to_string()],
            port: Some(4000),
            ..Default::default()
        };
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.openai_api_keys, vec!["sk-one", "sk-two"]);
        assert_eq!(config.openai_base_url(), "https://proxy.example.com/v1");
        assert!(!config.audio_transcription_enabled());
        assert!(!config.douyin.api_enabled());
        assert_eq!(config.email.service.as_deref(), Some("sendgrid"));
        assert_eq!(config.port(), 4000);
    }

    #[test]
    fn test_port_comes_from_bibi_port() {
        let env: HashMap<&str, &str> = HashMap::from([("PORT", "9999"), ("BIBI_PORT", "5050")]);
        let mut config = Config::default();
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.port(), 5050);

        let env: HashMap<&str, &str> = HashMap::from([("PORT", "9999")]);
        let mut config = Config::default();
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" a ,b,, c"), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }
}

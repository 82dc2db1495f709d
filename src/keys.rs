use eyre::{Result, bail};
use log::debug;
use rand::seq::SliceRandom;

use crate::config::{Config, split_list};

/// Credentials for an OpenAI-compatible endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub api_key: String,
    pub base_url: String,
}

/// True when every comma-separated entry looks like an OpenAI key
pub fn is_openai_key(value: &str) -> bool {
    let keys = split_list(value);
    !keys.is_empty() && keys.iter().all(|k| k.starts_with("sk-"))
}

/// Pick the key for one request: the caller's own key(s) if given, else one
/// of the server's keys, sampled at random to spread load.
pub fn select_api_key(user_key: Option<&str>, config: &Config) -> Result<ApiConfig> {
    let user_key = user_key.map(str::trim).filter(|k| !k.is_empty());

    let api_key = match user_key {
        Some(key) if is_openai_key(key) => sample(&split_list(key))?,
        Some(_) => bail!("licenseKey is not validated! Provide an OpenAI API key (sk-...)"),
        None => {
            if config.openai_api_keys.is_empty() {
                bail!("No OPENAI_API_KEY found in environment variables and no user API key provided");
            }
            sample(&config.openai_api_keys)?
        }
    };

    let prefix: String = api_key.chars().take(10).collect();
    debug!("Selected API key {prefix}... for {}", config.openai_base_url());

    Ok(ApiConfig {
        api_key,
        base_url: config.openai_base_url().to_string(),
    })
}

fn sample(keys: &[String]) -> Result<String> {
    keys.choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| eyre::eyre!("Failed to select a valid API key"))
}

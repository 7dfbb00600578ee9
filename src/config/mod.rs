use crate::utils::get_chanvault_home;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default Discord-compatible REST endpoint.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v9";

/// Configuration for a backup run. Loaded from `~/.chanvault/config.json`
/// (camelCase keys); every field has a default so a partial file is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Bearer credential for the remote API. The `DISCORD_TOKEN` environment
    /// variable takes precedence when set.
    pub token: String,
    /// Base URL of the remote API.
    pub api_base: String,
    /// Root directory for per-channel backup artifacts.
    pub backup_root: String,
    /// Messages requested per page (API maximum is 100).
    pub page_limit: u32,
    /// Politeness delay between successive page requests, in milliseconds.
    pub request_delay_ms: u64,
    /// Maximum attempts per page before a transient error becomes fatal.
    pub max_retries: u32,
    /// Channel name → channel id. Names are used for directory naming.
    pub channels: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            backup_root: "backups".to_string(),
            page_limit: 100,
            request_delay_ms: 1500,
            max_retries: 5,
            channels: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Resolve the API credential: environment variable first, then the
    /// config file. An empty credential is a configuration error.
    pub fn resolve_token(&self) -> Result<String> {
        if let Ok(token) = std::env::var("DISCORD_TOKEN")
            && !token.is_empty()
        {
            return Ok(token);
        }
        if self.token.is_empty() {
            anyhow::bail!(
                "No API token configured. Set DISCORD_TOKEN or the `token` field in {}",
                get_config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "config.json".to_string())
            );
        }
        Ok(self.token.clone())
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_chanvault_home()?.join("config.json"))
}

pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?;
        return Ok(config);
    }

    Ok(Config::default())
}

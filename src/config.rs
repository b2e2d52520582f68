//! Configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{PROGRESS_KEY, THEME_KEY};
use crate::error::{ProgressError, Result};
use crate::sync::RemoteConfig;

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("algoquest")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub remote: RemoteSection,

    /// JSON file mapping topics to problem ids
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite cache file
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    #[serde(default = "default_progress_key")]
    pub progress_key: String,

    #[serde(default = "default_theme_key")]
    pub theme_key: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            progress_key: default_progress_key(),
            theme_key: default_theme_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSection {
    /// Progress API base URL; remote sync is off when unset
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Deadline for the reconcile fetch
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Loading state is released after this long, whatever the fetch does
    #[serde(default = "default_ui_guard")]
    pub ui_guard_secs: u64,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            fetch_timeout_secs: default_fetch_timeout(),
            ui_guard_secs: default_ui_guard(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl RemoteSection {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn ui_guard(&self) -> Duration {
        Duration::from_secs(self.ui_guard_secs)
    }

    /// HTTP client settings, if a remote is configured
    pub fn client_config(&self) -> Option<RemoteConfig> {
        self.base_url.as_ref().map(|base_url| RemoteConfig {
            base_url: base_url.clone(),
            api_key: self.api_key.clone(),
            request_timeout_secs: self.request_timeout_secs,
        })
    }
}

// Defaults
fn default_cache_path() -> PathBuf { default_data_dir().join("progress.db") }
fn default_progress_key() -> String { PROGRESS_KEY.to_string() }
fn default_theme_key() -> String { THEME_KEY.to_string() }
fn default_fetch_timeout() -> u64 { 15 }
fn default_ui_guard() -> u64 { 8 }
fn default_request_timeout() -> u64 { 30 }

impl Config {
    /// Load config from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ProgressError::Config(e.to_string()))
    }

    /// Save config to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ProgressError::Config(e.to_string()))?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        default_data_dir().join("config.toml")
    }
}

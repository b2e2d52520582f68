//! Local cache adapter
//!
//! Never fails toward the caller: loads fall back to a default record and
//! failed saves are logged, leaving the previous value in place.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::kv::KeyValueStore;
use crate::store::{self, ProgressRecord};

/// Well-known key for the progress document
pub const PROGRESS_KEY: &str = "algoquest_progress";

/// Well-known key for the theme preference
pub const THEME_KEY: &str = "algoquest-theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dark" => Some(Theme::Dark),
            "light" => Some(Theme::Light),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

pub struct LocalCache {
    kv: Box<dyn KeyValueStore>,
    progress_key: String,
    theme_key: String,
}

impl LocalCache {
    pub fn new(kv: impl KeyValueStore + 'static) -> Self {
        Self::with_keys(kv, PROGRESS_KEY, THEME_KEY)
    }

    pub fn with_keys(
        kv: impl KeyValueStore + 'static,
        progress_key: impl Into<String>,
        theme_key: impl Into<String>,
    ) -> Self {
        Self {
            kv: Box::new(kv),
            progress_key: progress_key.into(),
            theme_key: theme_key.into(),
        }
    }

    /// Load the cached record, or a default one on any failure
    pub fn load(&self) -> ProgressRecord {
        let raw = match self.kv.get(&self.progress_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %self.progress_key, "No cached progress, starting fresh");
                return ProgressRecord::default();
            }
            Err(e) => {
                error!(error = %e, "Error loading progress");
                return ProgressRecord::default();
            }
        };

        match store::deserialize(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Cached progress is corrupt, starting fresh");
                ProgressRecord::default()
            }
        }
    }

    /// Write the full record; failures are logged and swallowed
    pub fn save(&self, record: &ProgressRecord) {
        let raw = match store::serialize(record) {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "Error serializing progress");
                return;
            }
        };
        if let Err(e) = self.kv.set(&self.progress_key, &raw) {
            error!(error = %e, "Error saving progress");
        }
    }

    pub fn load_theme(&self) -> Theme {
        match self.kv.get(&self.theme_key) {
            Ok(Some(raw)) => Theme::parse(&raw).unwrap_or_default(),
            Ok(None) => Theme::default(),
            Err(e) => {
                warn!(error = %e, "Error loading theme preference");
                Theme::default()
            }
        }
    }

    pub fn save_theme(&self, theme: Theme) {
        if let Err(e) = self.kv.set(&self.theme_key, theme.as_str()) {
            error!(error = %e, "Error saving theme preference");
        }
    }
}

//! Persisted user settings in `~/.civitai-sync/config.json`.

use anyhow::{Context, Result};
use civitai_sync_core::metadata::{atomic_read_json, atomic_write_json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".civitai-sync";
const CONFIG_FILE: &str = "config.json";

/// Stored settings. Command-line flags take precedence over these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Seconds between API requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u64>,
    /// Keys written by other versions, kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserConfig {
    /// The stored API key, if it is not blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// Location of the user config file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// The config file in the user's home directory.
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(Self::at(home.join(CONFIG_DIR).join(CONFIG_FILE)))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config; a missing file yields defaults.
    pub fn load(&self) -> Result<UserConfig> {
        let config = atomic_read_json::<UserConfig>(&self.path)
            .with_context(|| format!("Failed to read config {}", self.path.display()))?;
        Ok(config.unwrap_or_default())
    }

    pub fn save(&self, config: &UserConfig) -> Result<()> {
        atomic_write_json(&self.path, config)
            .with_context(|| format!("Failed to write config {}", self.path.display()))
    }

    /// Store an API key, keeping every other setting.
    pub fn save_api_key(&self, api_key: &str) -> Result<()> {
        let api_key = api_key.trim();
        anyhow::ensure!(!api_key.is_empty(), "API key must not be empty");

        let mut config = self.load()?;
        config.api_key = Some(api_key.to_string());
        self.save(&config)
    }
}

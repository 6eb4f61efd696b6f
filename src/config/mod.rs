use crate::audio::{RoutingOptions, Settings};
use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Only writer of the level `Settings` a recording session snapshots.
    pub levels: Settings,
    pub routing: RoutingOptions,
    pub recording: RecordingConfig,
    pub permission: PermissionConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Where recordings are written. Defaults to the data directory.
    pub directory: Option<String>,
    /// Append a level diagnostic every N samples (and on every classification change).
    pub log_every_n_samples: u64,
    pub delete_after_playback: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            log_every_n_samples: 10,
            delete_after_playback: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Ask for confirmation before the first microphone access.
    pub prompt: bool,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self { prompt: true }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 3738 }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let config = Self::load_from(&config_path)?;
        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config file")?;
        config
            .levels
            .validate()
            .context("Invalid [levels] configuration")?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = self.to_toml()?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn recordings_dir(&self) -> Result<PathBuf> {
        match &self.recording.directory {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => global::recordings_dir(),
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

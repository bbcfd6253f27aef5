use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::model::{SET_COLLECTION, SET_PINS, SET_ROOTLIST};

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "spindle";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
}

/// Remote service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the collection/playlist/metadata endpoints
    pub base_url: String,
    /// Account whose collection is mirrored (empty = take it from credentials)
    pub username: String,
    /// Items requested per bootstrap page
    pub page_limit: u32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://spclient.wg.spotify.com".to_string(),
            username: String::new(),
            page_limit: 300,
            timeout_secs: 30,
        }
    }
}

/// Local mirror settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Mirror database path (empty = default data dir)
    pub db_path: Option<String>,
}

impl StorageConfig {
    /// Resolved database path, creating the default data directory if needed.
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.db_path {
            return Ok(PathBuf::from(path));
        }
        let data_dir = dirs::data_dir()
            .context("Failed to get data directory")?
            .join(APP_DIR_NAME);
        fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        Ok(data_dir.join("collection.redb"))
    }
}

/// Sync behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Collection sets scanned by `spindle-sync scan` with no arguments
    pub sets: Vec<String>,
    /// Capacity of the pending write channel
    pub write_queue_capacity: usize,
    /// Refresh content filters after scanning
    pub scan_content_filters: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sets: vec![
                SET_COLLECTION.to_string(),
                SET_PINS.to_string(),
                SET_ROOTLIST.to_string(),
            ],
            write_queue_capacity: 64,
            scan_content_filters: true,
        }
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR_NAME);

        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from file, or create default if not exists
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path).context("Failed to read config file")?;

            let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Generate example config content for documentation
    pub fn example_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};
use crate::models::RhrSource;

const OURA_API_URL: &str = "https://api.ouraring.com/v2";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub access_token: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub rhr_source: RhrSource,

    #[serde(default = "default_refresh_hour")]
    pub refresh_hour: u32,

    #[serde(default = "default_refresh_minute")]
    pub refresh_minute: u32,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("oura-sync");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("metrics.db").to_string_lossy().to_string()
}

fn default_base_url() -> String {
    OURA_API_URL.to_string()
}

fn default_refresh_hour() -> u32 {
    2
}

fn default_refresh_minute() -> u32 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            access_token: None,
            base_url: default_base_url(),
            rhr_source: RhrSource::default(),
            refresh_hour: default_refresh_hour(),
            refresh_minute: default_refresh_minute(),
        }
    }
}

impl Config {
    /// Load the config file, creating it with defaults on first run.
    /// The `OURA_PAT` environment variable overrides the file's token;
    /// this is the only place the environment is consulted.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        if let Ok(token) = std::env::var("OURA_PAT") {
            if !token.is_empty() {
                config.access_token = Some(token);
            }
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oura-sync")
            .join("config.toml")
    }
}

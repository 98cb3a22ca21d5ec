use crate::error::{MetadataError, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Path to the sqlite cache database file
    pub db_path: String,
    /// When false every lookup misses and every store is a no-op
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Default time-to-live for cached entries, in days
    #[serde(default = "default_expiration_days")]
    pub expiration_days: i64,
}

fn default_enabled() -> bool {
    true
}

fn default_expiration_days() -> i64 {
    30
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from(config_path: &str) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            MetadataError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path, e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }
}

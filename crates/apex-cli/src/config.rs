//! Host configuration
//!
//! One JSON file holds the engine tuning and the AI delegate connection.
//! A missing file means defaults; the API key may also come from the
//! environment so it never has to live on disk.

use std::path::Path;

use apex_engine::EngineConfig;
use apex_nodes::DelegateConfig;
use serde::{Deserialize, Serialize};
use tokio::fs;

pub const CONFIG_ENV: &str = "APEX_CONFIG";
pub const API_KEY_ENV: &str = "APEX_AI_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub delegate: DelegateConfig,
}

impl AppConfig {
    /// Load from `path`, or defaults when there is no file
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !fs::try_exists(path).await? {
            log::warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).await?;
        let config = serde_json::from_str(&contents).map_err(ConfigError::Parse)?;
        log::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Take the API key from `key` when the file did not set one
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        if !self.delegate.is_configured() {
            self.delegate.api_key = key.filter(|k| !k.trim().is_empty());
        }
        self
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, contents).await?;
        log::info!("Configuration saved to {:?}", path);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("apex.json"))).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(AppConfig::load(None).await.unwrap(), AppConfig::default());
    }

    #[tokio::test]
    async fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apex.json");
        fs::write(&path, r#"{ "engine": { "stepDelayMs": 0 }, "delegate": { "model": "gemini-1.5-pro" } }"#)
            .await
            .unwrap();

        let config = AppConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.engine.step_delay_ms, 0);
        assert_eq!(config.engine.max_steps, 10_000);
        assert_eq!(config.delegate.model, "gemini-1.5-pro");
        assert_eq!(config.delegate.timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("apex.json");
        let mut config = AppConfig::default();
        config.engine.default_sla_hours = 12;
        config.save(&path).await.unwrap();

        assert_eq!(AppConfig::load(Some(&path)).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apex.json");
        fs::write(&path, "{ engine: ").await.unwrap();
        assert!(matches!(AppConfig::load(Some(&path)).await, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_api_key_from_env_only_when_unset() {
        let config = AppConfig::default().with_api_key(Some("from-env".into()));
        assert_eq!(config.delegate.api_key.as_deref(), Some("from-env"));

        let mut file = AppConfig::default();
        file.delegate.api_key = Some("from-file".into());
        let config = file.with_api_key(Some("from-env".into()));
        assert_eq!(config.delegate.api_key.as_deref(), Some("from-file"));

        assert!(AppConfig::default().with_api_key(Some("  ".into())).delegate.api_key.is_none());
    }
}

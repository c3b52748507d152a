//! Client configuration storage
//!
//! Handles persistent storage of the engine endpoint, persistence service
//! location and reconnect policy.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::error::ConfigError;

/// File name inside the configuration directory
pub const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding [`ClientConfig::endpoint`]
pub const ENDPOINT_ENV: &str = "PIPELINE_ENDPOINT";

/// Environment variable overriding [`ClientConfig::persistence_url`]
pub const PERSISTENCE_URL_ENV: &str = "PIPELINE_PERSISTENCE_URL";

mod defaults {
    pub const ENDPOINT: &str = "127.0.0.1:8765";
    pub const PERSISTENCE_URL: &str = "http://127.0.0.1:8765/api";
    pub const RECONNECT_INTERVAL_MS: u64 = 3000;
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
    pub const REQUEST_TIMEOUT_MS: u64 = 10_000;
}

/// Auto-reconnect behavior for the execution channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Whether a dropped channel schedules another attempt
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    /// Fixed delay before each scheduled attempt
    #[serde(default = "default_reconnect_interval")]
    pub interval_ms: u64,
    /// Scheduled attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_true() -> bool {
    true
}

fn default_reconnect_interval() -> u64 {
    defaults::RECONNECT_INTERVAL_MS
}

fn default_max_attempts() -> u32 {
    defaults::MAX_RECONNECT_ATTEMPTS
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            interval_ms: defaults::RECONNECT_INTERVAL_MS,
            max_attempts: defaults::MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Full client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Execution engine address (`host:port`)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Base URL of the composite/pipeline persistence API
    #[serde(default = "default_persistence_url")]
    pub persistence_url: String,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Undo stack depth for the graph store
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_endpoint() -> String {
    defaults::ENDPOINT.to_string()
}

fn default_persistence_url() -> String {
    defaults::PERSISTENCE_URL.to_string()
}

fn default_history_depth() -> usize {
    pipeline_engine::history::DEFAULT_HISTORY_DEPTH
}

fn default_request_timeout() -> u64 {
    defaults::REQUEST_TIMEOUT_MS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            persistence_url: default_persistence_url(),
            reconnect: ReconnectConfig::default(),
            history_depth: default_history_depth(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from disk
    ///
    /// A missing file yields the defaults.
    pub async fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path)
            .await
            .map_err(ConfigError::Io)?;

        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save configuration to disk
    pub async fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        fs::create_dir_all(config_dir).await.map_err(ConfigError::Io)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        fs::write(&config_path, contents)
            .await
            .map_err(ConfigError::Io)?;

        log::info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    /// Apply `PIPELINE_ENDPOINT` / `PIPELINE_PERSISTENCE_URL` from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup; empty values are ignored
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|v| !v.is_empty()) {
            log::debug!("Endpoint overridden from environment: {}", endpoint);
            self.endpoint = endpoint;
        }
        if let Some(url) = lookup(PERSISTENCE_URL_ENV).filter(|v| !v.is_empty()) {
            log::debug!("Persistence URL overridden from environment: {}", url);
            self.persistence_url = url;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, "127.0.0.1:8765");
        assert!(config.reconnect.auto_reconnect);
        assert_eq!(config.reconnect.interval(), Duration::from_millis(3000));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.history_depth, 100);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"endpoint": "engine:9000", "reconnect": {"max_attempts": 2}}"#)
                .unwrap();
        assert_eq!(config.endpoint, "engine:9000");
        assert_eq!(config.reconnect.max_attempts, 2);
        assert_eq!(config.reconnect.interval_ms, 3000);
        assert_eq!(config.persistence_url, "http://127.0.0.1:8765/api");
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::default().with_overrides(|key| match key {
            ENDPOINT_ENV => Some("10.0.0.2:7000".to_string()),
            PERSISTENCE_URL_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.endpoint, "10.0.0.2:7000");
        assert_eq!(config.persistence_url, "http://127.0.0.1:8765/api");
    }

    #[tokio::test]
    async fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load(dir.path()).await.unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        let mut config = ClientConfig::default();
        config.reconnect.auto_reconnect = false;
        config.history_depth = 20;

        config.save(&nested).await.unwrap();
        assert_eq!(ClientConfig::load(&nested).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "not json").unwrap();
        assert!(matches!(
            ClientConfig::load(dir.path()).await,
            Err(ConfigError::Parse(_))
        ));
    }
}

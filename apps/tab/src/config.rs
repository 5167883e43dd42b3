//! Tab configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use encore_core::CoordinatorConfig;
use serde::Deserialize;

/// Tab configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TabConfig {
    /// Storage file shared by every tab on this machine.
    /// Override: `ENCORE_STORAGE_PATH`
    pub storage_path: PathBuf,

    /// Base URL of the auth server used for token refresh.
    /// Override: `ENCORE_AUTH_SERVER_URL`
    pub auth_server_url: String,

    /// Interval at which the remote device connector polls the provider (milliseconds).
    pub device_poll_interval_ms: u64,

    /// Coordinator timings and device settings.
    pub coordinator: CoordinatorConfig,
}

impl Default for TabConfig {
    fn default() -> Self {
        Self {
            storage_path: std::env::temp_dir().join("encore-shared-storage.json"),
            auth_server_url: "http://localhost:49500".to_string(),
            device_poll_interval_ms: 1_000,
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl TabConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ENCORE_STORAGE_PATH") {
            self.storage_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("ENCORE_AUTH_SERVER_URL") {
            self.auth_server_url = val;
        }

        if let Ok(val) = std::env::var("ENCORE_DEVICE_NAME") {
            self.coordinator.device_name = val;
        }

        if let Ok(val) = std::env::var("ENCORE_HEARTBEAT_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                self.coordinator.heartbeat_interval_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("ENCORE_LEADER_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.coordinator.leader_timeout_ms = ms;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_coordinator_keeps_defaults() {
        let config: TabConfig = serde_yaml::from_str(
            "auth_server_url: https://encore.example\ncoordinator:\n  heartbeat_interval_ms: 1000\n",
        )
        .unwrap();
        assert_eq!(config.auth_server_url, "https://encore.example");
        assert_eq!(config.coordinator.heartbeat_interval_ms, 1_000);
        assert_eq!(config.coordinator.leader_timeout_ms, 5_000);
        assert_eq!(config.device_poll_interval_ms, 1_000);
    }
}

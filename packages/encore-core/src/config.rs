//! Coordinator configuration.
//!
//! All fields have sensible defaults; binaries overlay YAML and environment
//! values on top and call [`CoordinatorConfig::validate`] before bootstrapping.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and device settings for one tab.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CoordinatorConfig {
    // Leadership
    /// Interval between leadership heartbeats (milliseconds).
    pub heartbeat_interval_ms: u64,

    /// Age after which a leader's heartbeat is considered dead (milliseconds).
    /// Must be strictly greater than `heartbeat_interval_ms`.
    pub leader_timeout_ms: u64,

    // Token refresh
    /// Lead time before token expiry at which a refresh is triggered (seconds).
    pub refresh_safety_margin_secs: u64,

    /// Delay before retrying a refresh that failed transiently (seconds).
    pub refresh_retry_secs: u64,

    // Playback
    /// Interval of the local position interpolation tick (milliseconds).
    pub position_tick_ms: u64,

    /// How long a play request waits for hand-off and device readiness (milliseconds).
    pub handoff_timeout_ms: u64,

    /// Device initialization attempts before playback is reported unavailable.
    pub max_connect_attempts: u32,

    /// Delay between device initialization attempts (milliseconds).
    pub reconnect_delay_ms: u64,

    /// Name the playback device registers under.
    pub device_name: String,

    /// Initial device volume (0.0 - 1.0).
    pub initial_volume: f32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 2_000,
            leader_timeout_ms: 5_000,
            refresh_safety_margin_secs: 300,
            refresh_retry_secs: 30,
            position_tick_ms: 500,
            handoff_timeout_ms: 10_000,
            max_connect_attempts: 3,
            reconnect_delay_ms: 2_000,
            device_name: "Grammys Prediction Player".to_string(),
            initial_volume: 0.5,
        }
    }
}

impl CoordinatorConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_interval_ms == 0 {
            return Err("heartbeat_interval_ms must be >= 1".to_string());
        }
        if self.heartbeat_interval_ms >= self.leader_timeout_ms {
            return Err(format!(
                "heartbeat_interval_ms ({}) must be smaller than leader_timeout_ms ({})",
                self.heartbeat_interval_ms, self.leader_timeout_ms
            ));
        }
        if self.refresh_retry_secs == 0 {
            return Err("refresh_retry_secs must be >= 1".to_string());
        }
        if self.position_tick_ms == 0 {
            return Err("position_tick_ms must be >= 1 (interval panics on 0)".to_string());
        }
        if self.max_connect_attempts == 0 {
            return Err("max_connect_attempts must be >= 1".to_string());
        }
        if self.device_name.trim().is_empty() {
            return Err("device_name must not be empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err("initial_volume must be within 0.0 - 1.0".to_string());
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn leader_timeout(&self) -> Duration {
        Duration::from_millis(self.leader_timeout_ms)
    }

    pub fn refresh_safety_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_safety_margin_secs)
    }

    pub fn refresh_retry(&self) -> Duration {
        Duration::from_secs(self.refresh_retry_secs)
    }

    pub fn position_tick(&self) -> Duration {
        Duration::from_millis(self.position_tick_ms)
    }

    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(2));
        assert_eq!(config.leader_timeout(), Duration::from_secs(5));
        assert_eq!(config.refresh_safety_margin(), Duration::from_secs(300));
    }

    #[test]
    fn rejects_heartbeat_not_below_timeout() {
        let config = CoordinatorConfig {
            heartbeat_interval_ms: 5_000,
            leader_timeout_ms: 5_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_values() {
        let zero_tick = CoordinatorConfig {
            position_tick_ms: 0,
            ..Default::default()
        };
        assert!(zero_tick.validate().is_err());

        let zero_attempts = CoordinatorConfig {
            max_connect_attempts: 0,
            ..Default::default()
        };
        assert!(zero_attempts.validate().is_err());
    }

    #[test]
    fn partial_yaml_like_json_keeps_defaults() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"heartbeat_interval_ms": 1000}"#).unwrap();
        assert_eq!(config.heartbeat_interval_ms, 1_000);
        assert_eq!(config.leader_timeout_ms, 5_000);
    }
}

use std::time::Duration;

use ofcore_codec::CODEC_VERSIONS;
use serde::{Deserialize, Serialize};

use crate::error::{ControllerError, Result};

/// Default poll cycle.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);
/// Default number of cycles a pending stats request may block new ones.
pub const DEFAULT_STATS_REQUEST_SKIP: u32 = 5;
/// Default bound for each event subscriber channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Controller behavior knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Period between statistics polls (and keepalive echoes).
    #[serde(with = "duration_secs")]
    pub stats_interval: Duration,
    /// Poll cycles skipped while a previous request is outstanding before it is
    /// abandoned.
    pub stats_request_skip: u32,
    /// Wire versions this controller will negotiate.
    pub supported_versions: Vec<u8>,
    /// Send an echo request to every established switch each poll cycle.
    pub send_echo_requests: bool,
    /// Push a set-config after the handshake.
    pub send_set_config: bool,
    /// Send a features request after every echo reply transmitted.
    pub send_features_request_on_echo: bool,
    /// Drop port updates older than the last one applied to the same interface.
    pub skip_late_interface_updates: bool,
    /// Bound for each event subscriber channel.
    pub event_channel_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            stats_interval: DEFAULT_STATS_INTERVAL,
            stats_request_skip: DEFAULT_STATS_REQUEST_SKIP,
            supported_versions: CODEC_VERSIONS.to_vec(),
            send_echo_requests: true,
            send_set_config: true,
            send_features_request_on_echo: false,
            skip_late_interface_updates: true,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl ControllerConfig {
    /// Check the configuration before it is used.
    pub fn validate(&self) -> Result<()> {
        if self.stats_interval < Duration::from_millis(2) {
            return Err(ControllerError::Config(format!(
                "stats_interval too short: {:?}",
                self.stats_interval
            )));
        }
        if self.supported_versions.is_empty() {
            return Err(ControllerError::Config(
                "supported_versions must not be empty".to_string(),
            ));
        }
        for version in &self.supported_versions {
            if !CODEC_VERSIONS.contains(version) {
                return Err(ControllerError::Config(format!(
                    "unsupported OpenFlow version 0x{version:02x} (have {})",
                    CODEC_VERSIONS
                        .iter()
                        .map(|v| format!("0x{v:02x}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
        }
        if self.event_channel_capacity == 0 {
            return Err(ControllerError::Config(
                "event_channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Highest configured version.
    pub fn max_version(&self) -> u8 {
        self.supported_versions.iter().copied().max().unwrap_or(0)
    }

    /// Configured versions, ascending and deduplicated.
    pub fn versions(&self) -> Vec<u8> {
        let mut versions = self.supported_versions.clone();
        versions.sort_unstable();
        versions.dedup();
        versions
    }

    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    pub fn with_supported_versions(mut self, versions: &[u8]) -> Self {
        self.supported_versions = versions.to_vec();
        self
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = ControllerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.stats_interval, Duration::from_secs(60));
        assert_eq!(config.stats_request_skip, 5);
        assert_eq!(config.supported_versions, vec![0x01, 0x04]);
        assert_eq!(config.max_version(), 0x04);
    }

    #[test]
    fn rejects_versions_without_codec() {
        let err = ControllerConfig::default()
            .with_supported_versions(&[0x04, 0x05])
            .validate()
            .unwrap_err();
        assert!(matches!(err, ControllerError::Config(msg) if msg.contains("0x05")));
    }

    #[test]
    fn rejects_empty_versions() {
        let err = ControllerConfig::default()
            .with_supported_versions(&[])
            .validate()
            .unwrap_err();
        assert!(matches!(err, ControllerError::Config(_)));
    }

    #[test]
    fn json_uses_seconds_and_fills_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"stats_interval": 30, "send_set_config": false}"#).unwrap();
        assert_eq!(config.stats_interval, Duration::from_secs(30));
        assert!(!config.send_set_config);
        assert_eq!(config.stats_request_skip, 5);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["stats_interval"], serde_json::json!(30.0));
    }
}

//! Configuration for the motion uplink engine.

use crate::core::aggregate::VoteRules;
use crate::core::windowing::{sample_count, CaptureTiming};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Highest sub-window count a one-byte payload slot can hold.
pub const MAX_SUB_WINDOWS: usize = u8::MAX as usize;

/// Main configuration for the engine and its driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Total capture duration per cycle
    #[serde(with = "duration_serde")]
    pub capture_duration: Duration,

    /// Time between accelerometer samples
    #[serde(with = "duration_serde")]
    pub sample_interval: Duration,

    /// Samples per classifier window
    pub window_samples: usize,

    /// Samples between consecutive sub-window starts
    pub stride_samples: usize,

    /// Divisor from raw sensor units to physical units
    pub axis_divisor: f32,

    /// Minimum category score for a vote, and the vote fraction for a decision
    pub min_confidence: f64,

    /// Minimum anomaly score for an anomaly vote
    pub anomaly_threshold: f32,

    /// Delay before re-polling when nothing was sent
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,

    /// Backoff after a classifier or signal conversion failure
    #[serde(with = "duration_serde")]
    pub failure_retry: Duration,

    /// Backoff after a duty-cycle rejection
    #[serde(with = "duration_serde")]
    pub duty_cycle_retry: Duration,

    /// Resolution of the coarse sleep in the sampling loop
    #[serde(with = "duration_serde")]
    pub sleep_granularity: Duration,

    /// Application port for uplinks
    pub tx_port: u8,

    /// When true, cycles follow radio events; otherwise a periodic timer
    pub duty_cycle_on: bool,

    /// Period of the timer used when duty cycling is off
    #[serde(with = "duration_serde")]
    pub tx_timer: Duration,

    /// Category labels of the model
    pub labels: Vec<String>,

    /// Path for storing the uplink log
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("motion-uplink");

        Self {
            capture_duration: Duration::from_millis(4000),
            sample_interval: Duration::from_millis(16),
            window_samples: 125,
            stride_samples: 6,
            axis_divisor: 100.0,
            min_confidence: 0.7,
            anomaly_threshold: 0.5,
            poll_interval: Duration::from_millis(1),
            failure_retry: Duration::from_millis(3000),
            duty_cycle_retry: Duration::from_millis(3000),
            sleep_granularity: Duration::from_millis(1),
            tx_port: 15,
            duty_cycle_on: true,
            tx_timer: Duration::from_millis(10_000),
            labels: vec!["idle".to_string(), "walk".to_string(), "shake".to_string()],
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("motion-uplink")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Samples in one full capture.
    pub fn capture_samples(&self) -> usize {
        sample_count(self.capture_duration, self.sample_interval)
    }

    /// Sub-windows evaluated per cycle.
    pub fn sub_windows(&self) -> usize {
        let captured = self.capture_samples();
        if self.stride_samples == 0 || captured < self.window_samples {
            return 0;
        }
        (captured - self.window_samples) / self.stride_samples + 1
    }

    pub fn capture_timing(&self) -> CaptureTiming {
        CaptureTiming {
            duration: self.capture_duration,
            sample_interval: self.sample_interval,
            sleep_granularity: self.sleep_granularity,
        }
    }

    pub fn vote_rules(&self) -> VoteRules {
        VoteRules {
            min_confidence: self.min_confidence as f32,
            anomaly_threshold: self.anomaly_threshold,
        }
    }

    /// Check that the settings describe a runnable pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.sample_interval.is_zero() {
            return invalid("sample_interval must be greater than zero".to_string());
        }
        if self.window_samples == 0 {
            return invalid("window_samples must be greater than zero".to_string());
        }
        if self.stride_samples == 0 {
            return invalid("stride_samples must be greater than zero".to_string());
        }
        if self.window_samples > self.capture_samples() {
            return invalid(format!(
                "window of {} samples does not fit a capture of {} samples",
                self.window_samples,
                self.capture_samples()
            ));
        }
        if self.sub_windows() > MAX_SUB_WINDOWS {
            return invalid(format!(
                "{} sub-windows per cycle exceeds the payload limit of {}",
                self.sub_windows(),
                MAX_SUB_WINDOWS
            ));
        }
        if !(self.min_confidence > 0.0 && self.min_confidence <= 1.0) {
            return invalid(format!("min_confidence {} outside (0, 1]", self.min_confidence));
        }
        if !(self.anomaly_threshold > 0.0 && self.anomaly_threshold <= 1.0) {
            return invalid(format!(
                "anomaly_threshold {} outside (0, 1]",
                self.anomaly_threshold
            ));
        }
        if self.axis_divisor == 0.0 || !self.axis_divisor.is_finite() {
            return invalid("axis_divisor must be a non-zero finite number".to_string());
        }
        if self.labels.is_empty() || self.labels.len() > MAX_SUB_WINDOWS - 2 {
            return invalid(format!(
                "label count {} outside 1..={}",
                self.labels.len(),
                MAX_SUB_WINDOWS - 2
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.capture_samples(), 250);
        assert_eq!(config.sub_windows(), 21);
        assert_eq!(config.tx_port, 15);
        assert!(config.duty_cycle_on);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let config = Config::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["capture_duration"], 4000);
        assert_eq!(json["poll_interval"], 1);

        let parsed: Config = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.duty_cycle_retry, Duration::from_secs(3));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = serde_json::from_str(r#"{ "poll_interval": 250 }"#).unwrap();
        assert_eq!(parsed.poll_interval, Duration::from_millis(250));
        assert_eq!(parsed.window_samples, 125);
    }

    #[test]
    fn test_validation_rejects_oversized_window() {
        let config = Config {
            window_samples: 300,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validation_rejects_too_many_sub_windows() {
        let config = Config {
            capture_duration: Duration::from_secs(60),
            stride_samples: 1,
            ..Config::default()
        };
        assert!(config.sub_windows() > MAX_SUB_WINDOWS);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_stride() {
        let config = Config {
            stride_samples: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}

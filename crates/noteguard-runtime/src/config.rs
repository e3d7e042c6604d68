//! Runtime configuration.
//!
//! Durations are written in human-readable form (`"30s"`, `"5m"`,
//! `"1h 30m"`). Missing fields take their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use noteguard_core::{DEFAULT_AUDIT_CAPACITY, DEFAULT_RECOMMENDATION_LIMIT};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for the fallback and trigger engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How often the health sweep refreshes `last_check`
    #[serde(with = "duration_str")]
    pub sweep_interval: Duration,

    /// Upper bound on a single action execution
    #[serde(with = "duration_str")]
    pub action_timeout: Duration,

    /// Upper bound on a trigger action's upfront delay
    #[serde(with = "duration_str")]
    pub max_action_delay: Duration,

    pub fallback_audit_capacity: usize,

    pub trigger_audit_capacity: usize,

    pub recommendation_limit: usize,

    /// Number of fallback log entries included in status snapshots
    pub status_log_tail: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
            action_timeout: Duration::from_secs(10),
            max_action_delay: Duration::from_secs(30),
            fallback_audit_capacity: DEFAULT_AUDIT_CAPACITY,
            trigger_audit_capacity: DEFAULT_AUDIT_CAPACITY,
            recommendation_limit: DEFAULT_RECOMMENDATION_LIMIT,
            status_log_tail: 20,
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }

        if self.action_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "action_timeout must be greater than zero".to_string(),
            ));
        }

        if self.fallback_audit_capacity == 0 || self.trigger_audit_capacity == 0 {
            return Err(ConfigError::Invalid(
                "audit capacities must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

//! Configuration for the HMB agent.
//!
//! Loading is lenient: a missing or malformed field falls back to its default
//! while valid sibling fields are kept. A bad config never stops the engine.

use crate::core::rules::ClassificationOptions;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Interval between periodic ticks
    #[serde(with = "duration_serde")]
    pub tick_interval: Duration,

    /// Delay before running a tick that was queued behind a running one
    pub queued_tick_delay_ms: u64,

    /// Pointer events closer than this are coalesced
    pub pointer_throttle_ms: u64,

    /// Upper bound on a tick's collaborator calls
    #[serde(with = "duration_serde")]
    pub dispatch_timeout: Duration,

    /// Classifier thresholds
    pub classification: ClassificationOptions,

    /// Per-user overrides
    pub profile: UserProfile,

    /// Voice coach settings
    pub voice_coach: VoiceCoachConfig,

    /// Whether page context may be used
    pub allow_page_context: bool,

    /// Whether typed text may be scanned for cues
    pub allow_typed_cues: bool,

    /// Capacity of the event channel
    pub feed_capacity: usize,

    /// Path for session summaries and transparency stats
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hmb-agent");

        Self {
            tick_interval: Duration::from_secs(10),
            queued_tick_delay_ms: 120,
            pointer_throttle_ms: 500,
            dispatch_timeout: Duration::from_secs(5),
            classification: ClassificationOptions::default(),
            profile: UserProfile::default(),
            voice_coach: VoiceCoachConfig::default(),
            allow_page_context: true,
            allow_typed_cues: true,
            feed_capacity: crate::collector::DEFAULT_FEED_CAPACITY,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Only an unreadable file or invalid JSON is an error; field-level
    /// problems are repaired with defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Load, falling back to defaults on any error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("using default configuration: {e}");
            Self::default()
        })
    }

    /// Parse configuration text leniently.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(content)?;
        Ok(Self::from_value(&value))
    }

    /// Build configuration from a JSON value, field by field.
    pub fn from_value(value: &Value) -> Self {
        let mut config = merge_lenient(Self::default(), value);
        if let Some(v) = value.get("classification") {
            config.classification = merge_lenient(config.classification, v);
        }
        if let Some(v) = value.get("profile") {
            config.profile = merge_lenient(config.profile, v);
            if let Some(sensitivity @ Value::Object(_)) = v.get("sensitivity") {
                let base = config.profile.sensitivity.take().unwrap_or_default();
                config.profile.sensitivity = Some(merge_lenient(base, sensitivity));
            }
        }
        if let Some(v) = value.get("voice_coach") {
            config.voice_coach = merge_lenient(config.voice_coach, v);
        }
        config
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hmb-agent")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    /// Classifier options with the profile applied.
    pub fn effective_options(&self) -> ClassificationOptions {
        self.classification.with_profile(&self.profile)
    }
}

/// User profile overrides for the classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub sensitivity: Option<Sensitivity>,
}

/// Sensitivity overrides; each one replaces a classifier default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sensitivity {
    /// Seconds without input before idle
    pub idle_timeout: Option<f64>,
    /// Switches in 60s before distracted
    pub distraction_threshold: Option<u32>,
}

/// Voice coach settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceCoachConfig {
    pub enabled: bool,
    pub cooldown_secs: u64,
}

impl Default for VoiceCoachConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 20,
        }
    }
}

/// Overlay the fields of `overlay` on `base` one at a time, keeping only
/// those that still deserialize.
fn merge_lenient<T>(base: T, overlay: &Value) -> T
where
    T: Serialize + DeserializeOwned,
{
    let Value::Object(fields) = overlay else {
        tracing::warn!("ignoring non-object configuration value");
        return base;
    };
    let mut merged = match serde_json::to_value(&base) {
        Ok(v @ Value::Object(_)) => v,
        _ => return base,
    };

    for (key, value) in fields {
        let mut candidate = merged.clone();
        candidate[key.as_str()] = value.clone();
        if serde_json::from_value::<T>(candidate.clone()).is_ok() {
            merged = candidate;
        } else {
            tracing::warn!(field = %key, "ignoring malformed configuration field");
        }
    }

    serde_json::from_value(merged).unwrap_or(base)
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tick_interval, Duration::from_secs(10));
        assert_eq!(config.queued_tick_delay_ms, 120);
        assert_eq!(config.classification.idle_seconds, 10.0);
        assert!(config.voice_coach.enabled);
    }

    #[test]
    fn test_malformed_fields_fall_back_individually() {
        let config = Config::from_json(
            r#"{
                "tick_interval": "soon",
                "queued_tick_delay_ms": 250,
                "classification": { "idleSeconds": "ten", "focusTabLimit": 4 },
                "voice_coach": { "enabled": false, "cooldown_secs": -1 },
                "unknown_field": true
            }"#,
        )
        .unwrap();

        assert_eq!(config.tick_interval, Duration::from_secs(10));
        assert_eq!(config.queued_tick_delay_ms, 250);
        assert_eq!(config.classification.idle_seconds, 10.0);
        assert_eq!(config.classification.focus_tab_limit, 4);
        assert!(!config.voice_coach.enabled);
        assert_eq!(config.voice_coach.cooldown_secs, 20);
    }

    #[test]
    fn test_non_object_yields_defaults() {
        let config = Config::from_json("[1, 2, 3]").unwrap();
        assert_eq!(config, Config::default());
        assert!(Config::from_json("{not json").is_err());
    }

    #[test]
    fn test_profile_feeds_effective_options() {
        let config = Config::from_json(
            r#"{ "profile": { "sensitivity": { "idleTimeout": 30, "distractionThreshold": 7 } } }"#,
        )
        .unwrap();
        let options = config.effective_options();
        assert_eq!(options.idle_seconds, 30.0);
        assert_eq!(options.tab_burst_threshold, 7);
    }

    #[test]
    fn test_malformed_sensitivity_keeps_valid_sibling() {
        let config = Config::from_json(
            r#"{ "profile": { "sensitivity": { "idleTimeout": "abc", "distractionThreshold": 7 } } }"#,
        )
        .unwrap();
        assert_eq!(
            config.profile.sensitivity,
            Some(Sensitivity {
                idle_timeout: None,
                distraction_threshold: Some(7),
            })
        );

        let options = config.effective_options();
        assert_eq!(options.idle_seconds, 10.0);
        assert_eq!(options.tab_burst_threshold, 7);
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(Config::from_json(&json).unwrap(), config);
    }
}

//! Signal engine configuration
//!
//! Parses the `engine:` section of a YAML configuration file. A missing
//! section, or missing keys, fall back to defaults.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::{load_yaml, load_yaml_string};

/// What happens to a run when a sync step returns an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorPolicy {
    /// Log the error and leave the run pending forever at the failed step
    #[default]
    Stall,

    /// Fail the run with the step's error
    Reject,

    /// Continue through the step's `error` output with the message as payload
    ErrorOutput,
}

/// Engine configuration from the `engine:` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sync step failure handling
    #[serde(default)]
    pub on_step_error: StepErrorPolicy,

    /// Completed traces kept per signal
    #[serde(default = "default_stored_traces")]
    pub stored_traces: usize,

    /// Buffer size of the completed trace broadcast channel
    #[serde(default = "default_trace_channel_capacity")]
    pub trace_channel_capacity: usize,

    /// Log level for binaries embedding the engine
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_stored_traces() -> usize {
    5
}

fn default_trace_channel_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            on_step_error: StepErrorPolicy::default(),
            stored_traces: default_stored_traces(),
            trace_channel_capacity: default_trace_channel_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load engine configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let yaml = load_yaml(path)?;
        Self::from_yaml(&yaml)
    }

    /// Load engine configuration from a YAML string
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let yaml = load_yaml_string(content, "<inline>")?;
        Self::from_yaml(&yaml)
    }

    /// Parse engine configuration from a processed YAML value
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        let section = match yaml {
            Value::Null => Value::Mapping(serde_yaml::Mapping::new()),
            Value::Mapping(mapping) => mapping
                .get(&Value::String("engine".to_string()))
                .cloned()
                .filter(|v| !v.is_null())
                .unwrap_or(Value::Mapping(serde_yaml::Mapping::new())),
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "root".to_string(),
                    reason: "configuration must be a mapping".to_string(),
                })
            }
        };

        let config: EngineConfig =
            serde_yaml::from_value(section).map_err(|e| ConfigError::InvalidValue {
                key: "engine".to_string(),
                reason: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.stored_traces == 0 {
            return Err(ConfigError::InvalidValue {
                key: "engine.stored_traces".to_string(),
                reason: "must keep at least one trace".to_string(),
            });
        }
        if self.trace_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "engine.trace_channel_capacity".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.on_step_error, StepErrorPolicy::Stall);
        assert_eq!(config.stored_traces, 5);
        assert_eq!(config.trace_channel_capacity, 64);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_parse_from_yaml() {
        let config = EngineConfig::from_yaml_str(
            r#"
engine:
  on_step_error: error_output
  stored_traces: 20
  log_level: debug
"#,
        )
        .unwrap();

        assert_eq!(config.on_step_error, StepErrorPolicy::ErrorOutput);
        assert_eq!(config.stored_traces, 20);
        assert_eq!(config.trace_channel_capacity, 64);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_missing_section_uses_defaults() {
        assert_eq!(
            EngineConfig::from_yaml_str("other: 1\n").unwrap(),
            EngineConfig::default()
        );
        assert_eq!(
            EngineConfig::from_yaml_str("").unwrap(),
            EngineConfig::default()
        );
        assert_eq!(
            EngineConfig::from_yaml_str("engine:\n").unwrap(),
            EngineConfig::default()
        );
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let err = EngineConfig::from_yaml_str("engine:\n  on_step_error: explode\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "engine"));
    }

    #[test]
    fn test_zero_traces_is_rejected() {
        let err = EngineConfig::from_yaml_str("engine:\n  stored_traces: 0\n").unwrap_err();
        assert!(err.to_string().contains("stored_traces"));
    }
}

//! YAML loader with custom tag support
//!
//! Supported tags:
//! - `!env_var VAR` - Environment variable substitution
//! - `!env_var VAR fallback` - Same, with a fallback when `VAR` is unset
//!
//! Substituted values are re-parsed as YAML scalars, so `!env_var TRACES`
//! with `TRACES=10` yields the integer `10`.

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

/// Load and process a YAML file
pub fn load_yaml(path: impl AsRef<Path>) -> ConfigResult<Value> {
    let path = path.as_ref();
    debug!("Loading YAML file: {:?}", path);

    let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_yaml_string(&content, path)
}

/// Load and process YAML from a string
///
/// `source_path` only labels parse errors.
pub fn load_yaml_string(content: &str, source_path: impl AsRef<Path>) -> ConfigResult<Value> {
    let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
        path: source_path.as_ref().to_path_buf(),
        source: e,
    })?;

    process_value(value)
}

/// Process a YAML value, handling custom tags
fn process_value(value: Value) -> ConfigResult<Value> {
    match value {
        Value::Tagged(tagged) => process_tagged(*tagged),
        Value::Mapping(map) => {
            let mut result = serde_yaml::Mapping::new();
            for (k, v) in map {
                result.insert(process_value(k)?, process_value(v)?);
            }
            Ok(Value::Mapping(result))
        }
        Value::Sequence(seq) => {
            let result: ConfigResult<Vec<Value>> = seq.into_iter().map(process_value).collect();
            Ok(Value::Sequence(result?))
        }
        _ => Ok(value),
    }
}

fn process_tagged(tagged: serde_yaml::value::TaggedValue) -> ConfigResult<Value> {
    let tag = tagged.tag.to_string();
    trace!("Processing tag '{}' with value {:?}", tag, tagged.value);

    match tag.as_str() {
        "!env_var" => process_env_var(tagged.value),
        _ => {
            // Unknown tag, keep it as-is but process the inner value
            let processed = process_value(tagged.value)?;
            Ok(Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
                tag: tagged.tag,
                value: processed,
            })))
        }
    }
}

/// Process !env_var tag
fn process_env_var(value: Value) -> ConfigResult<Value> {
    let spec = match value {
        Value::String(s) => s,
        _ => {
            return Err(ConfigError::InvalidValue {
                key: "!env_var".to_string(),
                reason: "environment variable name must be a string".to_string(),
            })
        }
    };

    let (var_name, fallback) = match spec.trim().split_once(char::is_whitespace) {
        Some((name, fallback)) => (name.to_string(), Some(fallback.trim().to_string())),
        None => (spec.trim().to_string(), None),
    };

    let raw = match (std::env::var(&var_name), fallback) {
        (Ok(value), _) => value,
        (Err(_), Some(fallback)) => fallback,
        (Err(_), None) => return Err(ConfigError::EnvVarNotFound { var: var_name }),
    };

    debug!("Substituted env var: {}", var_name);
    Ok(serde_yaml::from_str(&raw).unwrap_or(Value::String(raw)))
}

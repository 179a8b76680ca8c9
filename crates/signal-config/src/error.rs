//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Why engine configuration could not be loaded
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read engine config {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("engine config {path} is not valid YAML: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `!env_var` named a variable that is unset and has no fallback
    #[error("!env_var {var} is not set and has no fallback")]
    EnvVarNotFound { var: String },

    #[error("{key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

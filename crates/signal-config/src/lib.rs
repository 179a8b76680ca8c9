//! YAML configuration for the signal engine
//!
//! This crate loads [`EngineConfig`] from the `engine:` section of a YAML
//! file. Values may come from the environment through the `!env_var` tag:
//!
//! ```yaml
//! engine:
//!   on_step_error: !env_var SIGNAL_STEP_ERRORS stall
//!   stored_traces: 10
//! ```
//!
//! # Example
//!
//! ```ignore
//! use signal_config::EngineConfig;
//!
//! let config = EngineConfig::load("/etc/signals/engine.yaml")?;
//! ```

mod engine_config;
mod error;
mod loader;

pub use engine_config::{EngineConfig, StepErrorPolicy};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;

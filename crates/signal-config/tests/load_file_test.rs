//! Loading engine configuration from files on disk

use signal_config::{ConfigError, EngineConfig, StepErrorPolicy};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.yaml");
    fs::write(
        &path,
        "engine:\n  on_step_error: reject\n  trace_channel_capacity: 8\n",
    )
    .unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.on_step_error, StepErrorPolicy::Reject);
    assert_eq!(config.trace_channel_capacity, 8);
    assert_eq!(config.stored_traces, 5);
}

#[test]
fn test_load_with_env_var() {
    std::env::set_var("SIGNAL_CONFIG_FILE_TEST_POLICY", "error_output");
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.yaml");
    fs::write(
        &path,
        "engine:\n  on_step_error: !env_var SIGNAL_CONFIG_FILE_TEST_POLICY\n",
    )
    .unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.on_step_error, StepErrorPolicy::ErrorOutput);
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = EngineConfig::load(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
}

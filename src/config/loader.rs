//! Configuration file loading.

use crate::config::{validate_config, Config};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Load and validate configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_config(&contents)
}

/// Parse and validate configuration from a YAML string.
///
/// An empty document yields the defaults.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    let config: Config = if contents.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(contents)?
    };

    validate_config(&config).map_err(ConfigError::ValidationError)?;

    Ok(config)
}

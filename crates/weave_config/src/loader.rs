//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::WeaveConfig;
use std::path::Path;

/// Name of the configuration file within a project directory.
pub const CONFIG_FILE: &str = "weave.toml";

/// Loads and validates a `weave.toml` configuration from a project directory.
///
/// Reads `<project_dir>/weave.toml`, parses it, and validates its values.
pub fn load_config(project_dir: &Path) -> Result<WeaveConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `weave.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<WeaveConfig, ConfigError> {
    let config: WeaveConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and values are consistent.
fn validate_config(config: &WeaveConfig) -> Result<(), ConfigError> {
    let generation = &config.generation;
    if generation.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::MissingField("generation.output_dir".to_string()));
    }
    if generation.cache_dir.as_os_str().is_empty() {
        return Err(ConfigError::MissingField("generation.cache_dir".to_string()));
    }
    // A full wipe of the output directory must never take the cache with it.
    if generation.cache_dir.starts_with(&generation.output_dir) {
        return Err(ConfigError::ValidationError(format!(
            "cache_dir '{}' must not be inside output_dir '{}'",
            generation.cache_dir.display(),
            generation.output_dir.display()
        )));
    }
    if generation.max_rounds == Some(0) {
        return Err(ConfigError::ValidationError(
            "max_rounds must be positive".to_string(),
        ));
    }
    if generation.disabled.iter().any(|id| id.is_empty()) {
        return Err(ConfigError::ValidationError(
            "disabled generator ids must not be empty".to_string(),
        ));
    }
    Ok(())
}

use crate::config::types::Config;
use crate::config::validation::{validate, validate_rules};
use crate::extract::Rule;
use crate::ConfigError;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// A standalone rule set file: only `[[rules]]` tables
#[derive(Debug, Deserialize)]
struct RuleSet {
    #[serde(default)]
    rules: Vec<Rule>,
}

/// Loads a rule set from a TOML file containing `[[rules]]` tables
///
/// Rules are validated the same way as rules embedded in the main
/// configuration.
pub fn load_rules(path: &Path) -> Result<Vec<Rule>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let set: RuleSet = toml::from_str(&content)?;
    validate_rules(&set.rules)?;
    Ok(set.rules)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is logged at startup so a run can be tied to the exact
/// configuration that produced it.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

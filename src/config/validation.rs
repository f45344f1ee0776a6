use crate::config::types::{Config, OutputConfig, RetryConfig, TaskConfig};
use crate::extract::Rule;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_task_config(&config.task)?;
    validate_output_config(&config.output)?;
    validate_rules(&config.rules)?;
    Ok(())
}

/// Validates task configuration
///
/// Also used by the scheduler, so tasks built in code get the same checks
/// as tasks loaded from a file.
pub fn validate_task_config(config: &TaskConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.sitemap_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid sitemap_url '{}': {}", config.sitemap_url, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "sitemap_url '{}' must use http or https",
            config.sitemap_url
        )));
    }

    if config.delay_min_ms >= config.delay_max_ms {
        return Err(ConfigError::Validation(format!(
            "delay_min_ms must be less than delay_max_ms, got {}..{}",
            config.delay_min_ms, config.delay_max_ms
        )));
    }

    if config.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "timeout_ms must be greater than 0".to_string(),
        ));
    }

    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.per_domain_concurrency < 1 {
        return Err(ConfigError::Validation(format!(
            "per_domain_concurrency must be >= 1, got {}",
            config.per_domain_concurrency
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1".to_string(),
        ));
    }

    if config.robots_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "robots_agent cannot be empty".to_string(),
        ));
    }

    if config.fingerprints.is_empty() {
        return Err(ConfigError::Validation(
            "fingerprints must contain at least one entry".to_string(),
        ));
    }

    if let Some(pos) = config
        .fingerprints
        .iter()
        .position(|fp| fp.user_agent().trim().is_empty())
    {
        return Err(ConfigError::Validation(format!(
            "fingerprint {} has an empty user agent",
            pos
        )));
    }

    validate_retry_config(&config.retry)?;

    Ok(())
}

/// Validates backoff configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.initial_backoff_ms > config.max_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "initial_backoff_ms ({}) cannot exceed max_backoff_ms ({})",
            config.initial_backoff_ms, config.max_backoff_ms
        )));
    }

    if !config.multiplier.is_finite() || config.multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "retry multiplier must be >= 1.0, got {}",
            config.multiplier
        )));
    }

    if !(0.0..=1.0).contains(&config.jitter) {
        return Err(ConfigError::Validation(format!(
            "retry jitter must be between 0.0 and 1.0, got {}",
            config.jitter
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a rule set
///
/// Rule shape (attribute only on attribute rules) is enforced when each
/// rule is built; this checks the set as a whole.
pub fn validate_rules(rules: &[Rule]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();

    for rule in rules {
        if rule.selector.trim().is_empty() {
            return Err(ConfigError::InvalidRule(format!(
                "rule '{}' has an empty selector",
                rule.name
            )));
        }

        if !names.insert(rule.name.as_str()) {
            return Err(ConfigError::InvalidRule(format!(
                "duplicate rule name '{}'",
                rule.name
            )));
        }
    }

    Ok(())
}

//! Configuration module for Sitemap-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sitemap_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvesting {} with {} rules", config.task.sitemap_url, config.rules.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, FingerprintConfig, OutputConfig, RetryConfig, TaskConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, load_rules};
pub use validation::{validate_rules, validate_task_config};

//! Sitemap-Harvest: a polite sitemap crawler with CSS-selector extraction
//!
//! This crate expands sitemaps into page URLs, fetches every page while
//! respecting robots.txt and per-domain rate limits, extracts structured
//! fields with user-defined selector rules, and hands the results to a sink.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod robots;
pub mod sitemap;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sitemap-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Sitemap error: {0}")]
    Sitemap(#[from] sitemap::SitemapError),

    #[error("Failed to resolve root sitemap {url}: {source}")]
    RootResolution {
        url: String,
        #[source]
        source: sitemap::SitemapError,
    },

    #[error("No sitemap found for {url}")]
    NoSitemapFound { url: String },

    #[error("URL disallowed by robots.txt: {url}")]
    PolicyDenied { url: String },

    #[error("Invalid task transition: {from} -> {to}")]
    InvalidTransition {
        from: state::TaskStatus,
        to: state::TaskStatus,
    },

    #[error("Politeness gate closed for domain {0}")]
    GateClosed(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sitemap-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{FetchClient, PolitenessGate, TaskHandle, TaskScheduler};
pub use extract::{extract, ContentKind, Rule};
pub use sitemap::SitemapResolver;
pub use state::{PageStatus, TaskProgress, TaskStatus};
pub use storage::{DuplicateStrategy, ResultSink};
pub use url::{extract_domain, normalize_url};

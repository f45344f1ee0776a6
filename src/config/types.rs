use crate::extract::Rule;
use crate::storage::DuplicateStrategy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Sitemap-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub task: TaskConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Task behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TaskConfig {
    /// Root sitemap URL, or a site URL when `discover` is set
    pub sitemap_url: String,

    /// Discover sitemaps from robots.txt and well-known paths
    #[serde(default)]
    pub discover: bool,

    /// Follow `<sitemap>` children of sitemap indexes
    #[serde(default = "default_true")]
    pub follow_nested: bool,

    /// Maximum nesting depth of sitemap indexes (root is depth 0)
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum number of page URLs taken from the sitemaps
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Number of concurrent workers
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Maximum concurrent requests to a single domain
    #[serde(default = "default_per_domain_concurrency")]
    pub per_domain_concurrency: u32,

    /// Lower bound of the delay between requests to a domain (milliseconds)
    #[serde(default = "default_delay_min_ms")]
    pub delay_min_ms: u64,

    /// Upper bound of the delay between requests to a domain (milliseconds)
    #[serde(default = "default_delay_max_ms")]
    pub delay_max_ms: u64,

    /// Total time allowed for one fetch attempt (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Redirects followed per request
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Honor robots.txt rules and crawl-delay
    #[serde(default = "default_true")]
    pub respect_robots: bool,

    /// Product token matched against robots.txt user-agent groups
    #[serde(default = "default_robots_agent")]
    pub robots_agent: String,

    /// Request fingerprints; one is picked at random per attempt
    #[serde(default = "default_fingerprints")]
    pub fingerprints: Vec<FingerprintConfig>,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// A fingerprint entry: either a bare User-Agent or a User-Agent with headers
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FingerprintConfig {
    UserAgent(String),
    #[serde(rename_all = "kebab-case")]
    Full {
        user_agent: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl FingerprintConfig {
    pub fn user_agent(&self) -> &str {
        match self {
            Self::UserAgent(ua) => ua,
            Self::Full { user_agent, .. } => user_agent,
        }
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        match self {
            Self::UserAgent(_) => Vec::new(),
            Self::Full { headers, .. } => headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// Backoff configuration for transient fetch failures
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Fraction of the backoff added or removed at random, 0.0 to 1.0
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// What to do when a document for an already stored URL arrives
    #[serde(default)]
    pub duplicate_strategy: DuplicateStrategy,
}

impl TaskConfig {
    /// Creates a configuration for `sitemap_url` with every other field at
    /// its default
    pub fn for_sitemap(sitemap_url: impl Into<String>) -> Self {
        Self {
            sitemap_url: sitemap_url.into(),
            discover: false,
            follow_nested: true,
            max_depth: default_max_depth(),
            max_pages: default_max_pages(),
            concurrency: default_concurrency(),
            per_domain_concurrency: default_per_domain_concurrency(),
            delay_min_ms: default_delay_min_ms(),
            delay_max_ms: default_delay_max_ms(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            max_redirects: default_max_redirects(),
            respect_robots: true,
            robots_agent: default_robots_agent(),
            fingerprints: default_fingerprints(),
            retry: RetryConfig::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.delay_min_ms),
            Duration::from_millis(self.delay_max_ms),
        )
    }
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> u32 {
    3
}

/// Sitemap protocol limit for a single file
fn default_max_pages() -> usize {
    50_000
}

fn default_concurrency() -> u32 {
    4
}

fn default_per_domain_concurrency() -> u32 {
    2
}

fn default_delay_min_ms() -> u64 {
    500
}

fn default_delay_max_ms() -> u64 {
    1500
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_redirects() -> usize {
    10
}

fn default_robots_agent() -> String {
    "SitemapHarvest".to_string()
}

fn default_fingerprints() -> Vec<FingerprintConfig> {
    vec![FingerprintConfig::UserAgent(concat!(
        "SitemapHarvest/",
        env!("CARGO_PKG_VERSION")
    )
    .to_string())]
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

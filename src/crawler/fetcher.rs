//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests of a task, including:
//! - Building the shared HTTP client with redirect and compression settings
//! - Fingerprint rotation (User-Agent and extra headers per attempt)
//! - Per-attempt timeouts
//! - Retry with exponential backoff for transient failures
//! - Error classification

use crate::config::{FingerprintConfig, TaskConfig};
use crate::crawler::retry::RetryPolicy;
use chrono::Utc;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// User-Agent plus extra headers presented on a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub user_agent: String,
    pub headers: Vec<(String, String)>,
}

impl Fingerprint {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            headers: Vec::new(),
        }
    }
}

impl From<&FingerprintConfig> for Fingerprint {
    fn from(config: &FingerprintConfig) -> Self {
        Self {
            user_agent: config.user_agent().to_string(),
            headers: config.headers(),
        }
    }
}

/// Per-task request settings
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Bound on one attempt: connect, send and body read
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub fingerprints: Arc<Vec<Fingerprint>>,
}

impl FetchSettings {
    pub fn from_task_config(config: &TaskConfig) -> Self {
        Self {
            timeout: config.timeout(),
            retry: RetryPolicy::from_config(config.max_retries, &config.retry),
            fingerprints: Arc::new(config.fingerprints.iter().map(Fingerprint::from).collect()),
        }
    }

    /// Picks a fingerprint uniformly at random
    pub fn pick_fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprints.choose(&mut rand::thread_rng())
    }
}

/// A successful response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub body: Vec<u8>,
    pub status: u16,
    /// URL after redirects
    pub final_url: Url,
    /// Attempts spent, first one included
    pub attempts: u32,
}

impl FetchResponse {
    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Fetch failures, after retries were applied
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Timed out fetching {url} after {attempts} attempt(s)")]
    Timeout { url: String, attempts: u32 },

    #[error("Failed to fetch {url} after {attempts} attempt(s): {message}")]
    Transient {
        url: String,
        status: Option<u16>,
        message: String,
        attempts: u32,
    },

    #[error("Failed to fetch {url}: {message}")]
    Terminal {
        url: String,
        status: Option<u16>,
        message: String,
        attempts: u32,
    },
}

impl FetchError {
    /// Last HTTP status received, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Timeout { .. } => None,
            Self::Transient { status, .. } | Self::Terminal { status, .. } => *status,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Timeout { attempts, .. }
            | Self::Transient { attempts, .. }
            | Self::Terminal { attempts, .. } => *attempts,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }
}

/// Outcome of a single failed attempt
#[derive(Debug)]
enum AttemptError {
    Transient {
        status: Option<u16>,
        message: String,
        retry_after: Option<Duration>,
        timed_out: bool,
    },
    Terminal {
        status: Option<u16>,
        message: String,
    },
}

impl AttemptError {
    fn transient(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transient {
            status,
            message: message.into(),
            retry_after: None,
            timed_out: false,
        }
    }

    fn timed_out() -> Self {
        Self::Transient {
            status: None,
            message: "request timed out".to_string(),
            retry_after: None,
            timed_out: true,
        }
    }
}

/// Builds the HTTP client shared by every task
///
/// Redirects are followed up to `max_redirects` hops. Timeouts are applied
/// per attempt by `FetchClient::fetch`, not here.
pub fn build_http_client(max_redirects: usize) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(max_redirects))
        .gzip(true)
        .brotli(true)
        .build()
}

/// HTTP fetcher with fingerprint rotation and bounded retry
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    /// Redirect limit the client was built with; unknown for foreign clients
    max_redirects: Option<usize>,
}

impl FetchClient {
    pub fn new(max_redirects: usize) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(max_redirects)?,
            max_redirects: Some(max_redirects),
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            max_redirects: None,
        }
    }

    pub fn max_redirects(&self) -> Option<usize> {
        self.max_redirects
    }

    /// The underlying reqwest client
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Fetches `url`, retrying transient failures
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Success |
    /// | 5xx | Retry with backoff |
    /// | 429 | Retry after `Retry-After` (clamped) or backoff |
    /// | Timeout, connection error, body error | Retry with backoff |
    /// | Other 4xx, 3xx | Terminal |
    /// | DNS failure, invalid request | Terminal |
    ///
    /// At most `1 + max_retries` attempts are made.
    pub async fn fetch(
        &self,
        url: &Url,
        settings: &FetchSettings,
    ) -> Result<FetchResponse, FetchError> {
        self.fetch_paced(url, settings, |_| async {}).await
    }

    /// Like `fetch`, but awaits `pace(attempt)` after the backoff of every
    /// retry, before the attempt is sent
    ///
    /// The scheduler passes the politeness gate here so that retries keep
    /// the domain's minimum interval.
    pub async fn fetch_paced<F, Fut>(
        &self,
        url: &Url,
        settings: &FetchSettings,
        mut pace: F,
    ) -> Result<FetchResponse, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = match tokio::time::timeout(settings.timeout, self.attempt(url, settings))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(AttemptError::timed_out()),
            };

            let (status, message, retry_after, timed_out) = match outcome {
                Ok((status, final_url, body)) => {
                    tracing::debug!(
                        "Fetched {} (HTTP {}, {} bytes, attempt {})",
                        url,
                        status,
                        body.len(),
                        attempt
                    );
                    return Ok(FetchResponse {
                        body,
                        status,
                        final_url,
                        attempts: attempt,
                    });
                }
                Err(AttemptError::Terminal { status, message }) => {
                    tracing::debug!("Terminal failure for {}: {}", url, message);
                    return Err(FetchError::Terminal {
                        url: url.to_string(),
                        status,
                        message,
                        attempts: attempt,
                    });
                }
                Err(AttemptError::Transient {
                    status,
                    message,
                    retry_after,
                    timed_out,
                }) => (status, message, retry_after, timed_out),
            };

            if !settings.retry.should_retry(attempt) {
                tracing::debug!("Giving up on {} after {} attempts", url, attempt);
                return Err(if timed_out {
                    FetchError::Timeout {
                        url: url.to_string(),
                        attempts: attempt,
                    }
                } else {
                    FetchError::Transient {
                        url: url.to_string(),
                        status,
                        message,
                        attempts: attempt,
                    }
                });
            }

            let delay = match retry_after {
                Some(requested) => settings.retry.clamp(requested),
                None => settings.retry.calculate_backoff(attempt),
            };
            tracing::debug!(
                "Attempt {} for {} failed ({}), retrying in {:?}",
                attempt,
                url,
                message,
                delay
            );
            tokio::time::sleep(delay).await;
            pace(attempt + 1).await;
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        settings: &FetchSettings,
    ) -> Result<(u16, Url, Vec<u8>), AttemptError> {
        let mut request = self.client.get(url.clone());
        if let Some(fingerprint) = settings.pick_fingerprint() {
            request = request.header(USER_AGENT, fingerprint.user_agent.as_str());
            for (name, value) in &fingerprint.headers {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request.send().await.map_err(classify_error)?;
        let status = response.status();
        let code = status.as_u16();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::Transient {
                status: Some(code),
                message: format!("HTTP {}", code),
                retry_after: parse_retry_after(response.headers()),
                timed_out: false,
            });
        }

        if status.is_server_error() {
            return Err(AttemptError::transient(Some(code), format!("HTTP {}", code)));
        }

        if !status.is_success() {
            return Err(AttemptError::Terminal {
                status: Some(code),
                message: format!("HTTP {}", code),
            });
        }

        let final_url = response.url().clone();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::timed_out()
            } else {
                AttemptError::transient(Some(code), format!("failed to read body: {}", e))
            }
        })?;

        Ok((code, final_url, body.to_vec()))
    }
}

/// Maps a reqwest error to a retry decision
fn classify_error(e: reqwest::Error) -> AttemptError {
    if e.is_timeout() {
        return AttemptError::timed_out();
    }

    if e.is_builder() {
        return AttemptError::Terminal {
            status: None,
            message: format!("invalid request: {}", e),
        };
    }

    if e.is_redirect() {
        return AttemptError::Terminal {
            status: e.status().map(|s| s.as_u16()),
            message: format!("redirect error: {}", e),
        };
    }

    if is_dns_error(&e) {
        return AttemptError::Terminal {
            status: None,
            message: format!("DNS resolution failed: {}", e),
        };
    }

    if e.is_connect() {
        return AttemptError::transient(None, format!("connection failed: {}", e));
    }

    AttemptError::transient(None, e.to_string())
}

/// Returns true if a resolver failure is somewhere in the error chain
fn is_dns_error(e: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        let message = err.to_string().to_lowercase();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return true;
        }
        source = err.source();
    }
    false
}

/// Parses `Retry-After` as delta seconds or an HTTP date
///
/// A date in the past yields zero.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching
//! robots.txt files.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::ParsedRobots;

use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Time allowed for a robots.txt request
pub const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches robots.txt for the origin of `url`
///
/// A missing file, a non-success status or any transport failure yields an
/// allow-all policy; robots.txt never blocks a crawl by being unreachable.
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - Any URL on the origin whose robots.txt should be fetched
/// * `user_agent` - The User-Agent header to send
pub async fn fetch_robots(client: &Client, url: &Url, user_agent: &str) -> ParsedRobots {
    let Some(robots_url) = crate::url::robots_url(url) else {
        return ParsedRobots::allow_all();
    };

    let response = client
        .get(robots_url.clone())
        .header(USER_AGENT, user_agent)
        .timeout(ROBOTS_TIMEOUT)
        .send()
        .await;

    match response {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(body) => {
                tracing::debug!("Fetched {} ({} bytes)", robots_url, body.len());
                ParsedRobots::from_content(&body)
            }
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", robots_url, e);
                ParsedRobots::allow_all()
            }
        },
        Ok(response) => {
            tracing::debug!(
                "No robots.txt at {} (HTTP {}), allowing all",
                robots_url,
                response.status()
            );
            ParsedRobots::allow_all()
        }
        Err(e) => {
            tracing::warn!("Failed to fetch {}: {}, allowing all", robots_url, e);
            ParsedRobots::allow_all()
        }
    }
}


//! Per-domain politeness enforcement
//!
//! This module handles:
//! - robots.txt fetching and caching per domain
//! - Per-domain concurrency slots
//! - Minimum inter-request intervals from the delay range and crawl-delay
//!
//! One `PolitenessGate` is shared by every task of the process, so two tasks
//! targeting the same domain share its slots and its interval.

use crate::config::TaskConfig;
use crate::robots::{fetch_robots, CachedRobots};
use crate::state::DomainState;
use crate::url::extract_domain;
use crate::HarvestError;
use rand::Rng;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use url::Url;

/// Politeness settings of one task
#[derive(Debug, Clone, PartialEq)]
pub struct PolitenessPolicy {
    pub delay_min: Duration,
    pub delay_max: Duration,
    /// Apply robots.txt disallow rules and crawl-delay
    pub respect_robots: bool,
    /// Product token matched against robots.txt groups
    pub robots_agent: String,
}

impl PolitenessPolicy {
    pub fn from_task_config(config: &TaskConfig) -> Self {
        let (delay_min, delay_max) = config.delay_range();
        Self {
            delay_min,
            delay_max,
            respect_robots: config.respect_robots,
            robots_agent: config.robots_agent.clone(),
        }
    }

    /// Uniform sample from the delay range
    pub fn sample_delay(&self) -> Duration {
        if self.delay_max <= self.delay_min {
            return self.delay_min;
        }
        rand::thread_rng().gen_range(self.delay_min..=self.delay_max)
    }
}

/// A granted request slot; the slot is released on drop
#[derive(Debug)]
pub struct DomainPermit {
    domain: String,
    _slot: OwnedSemaphorePermit,
}

impl DomainPermit {
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

/// Registry of per-domain politeness state
pub struct PolitenessGate {
    /// Client used for robots.txt requests
    client: Client,

    /// User-Agent sent when fetching robots.txt
    user_agent: String,

    /// Slots per domain
    per_domain_concurrency: usize,

    /// Domain key -> state, created on first contact
    registry: Mutex<HashMap<String, Arc<DomainState>>>,
}

impl PolitenessGate {
    pub fn new(client: Client, per_domain_concurrency: usize) -> Self {
        Self {
            client,
            user_agent: concat!("SitemapHarvest/", env!("CARGO_PKG_VERSION")).to_string(),
            per_domain_concurrency: per_domain_concurrency.max(1),
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Concurrency slots granted per domain
    pub fn per_domain_concurrency(&self) -> usize {
        self.per_domain_concurrency
    }

    /// Sets the User-Agent used for robots.txt requests
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Gets or creates the state of `domain`
    pub fn domain(&self, domain: &str) -> Arc<DomainState> {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(DomainState::new(self.per_domain_concurrency)))
            .clone()
    }

    /// Number of domains contacted so far
    pub fn domain_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Checks robots.txt for `url`
    ///
    /// The first call for a domain fetches its robots.txt; concurrent callers
    /// wait for that fetch instead of issuing their own.
    pub async fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        let allowed = self
            .with_robots(url, |robots| robots.is_allowed(url.as_str(), user_agent))
            .await
            .unwrap_or(true);

        if !allowed {
            tracing::debug!("{} disallowed by robots.txt for {}", url, user_agent);
        }
        allowed
    }

    /// `Sitemap:` URLs declared in the robots.txt of `url`'s origin
    pub async fn robots_sitemaps(&self, url: &Url) -> Vec<String> {
        self.with_robots(url, |robots| robots.sitemaps())
            .await
            .unwrap_or_default()
    }

    /// Waits for a slot and for the domain's interval, then grants a request
    ///
    /// The interval is a fresh sample of the delay range, raised to the
    /// robots.txt crawl-delay when robots are respected and the file for the
    /// domain has already been loaded. Dropping the returned future gives up
    /// the wait.
    pub async fn authorize(
        &self,
        domain: &str,
        policy: &PolitenessPolicy,
    ) -> Result<DomainPermit, HarvestError> {
        let state = self.domain(domain);

        let slot = state
            .acquire_slot()
            .await
            .map_err(|_| HarvestError::GateClosed(domain.to_string()))?;

        self.pace(domain, policy).await;

        Ok(DomainPermit {
            domain: domain.to_string(),
            _slot: slot,
        })
    }

    /// Waits for the domain's interval without taking a slot
    ///
    /// Used for retries made while a permit is already held.
    pub async fn pace(&self, domain: &str, policy: &PolitenessPolicy) {
        let state = self.domain(domain);

        let mut interval = policy.sample_delay();
        if policy.respect_robots {
            let crawl_delay = state
                .robots()
                .lock()
                .await
                .as_ref()
                .and_then(|robots| robots.crawl_delay(&policy.robots_agent));
            if let Some(crawl_delay) = crawl_delay {
                interval = interval.max(crawl_delay);
            }
        }

        state.wait_for_turn(interval).await;
        tracing::trace!(
            "Granted request to {} (interval {:?}, {} granted)",
            domain,
            interval,
            state.request_count()
        );
    }

    /// Runs `f` against the cached robots.txt of `url`'s domain, loading or
    /// refreshing it first
    ///
    /// Returns `None` for URLs without a host.
    async fn with_robots<T>(&self, url: &Url, f: impl FnOnce(&CachedRobots) -> T) -> Option<T> {
        let domain = extract_domain(url)?;
        let state = self.domain(&domain);
        let mut robots = state.robots().lock().await;

        let needs_fetch = robots.as_ref().map_or(true, |cached| cached.is_stale());
        if needs_fetch {
            let parsed = fetch_robots(&self.client, url, &self.user_agent).await;
            *robots = Some(CachedRobots::new(parsed));
        }

        robots.as_ref().map(f)
    }
}

//! Per-domain robots.txt cache entries
//!
//! Entries expire after `ROBOTS_TTL` and are refetched on the next robots
//! lookup for their domain.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};

/// How long a fetched robots.txt stays authoritative
pub const ROBOTS_TTL_HOURS: i64 = 24;

/// Upper bound applied to declared crawl-delays, in seconds
pub const MAX_CRAWL_DELAY_SECS: f64 = 300.0;

/// A robots.txt file and the time it was loaded
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub robots: ParsedRobots,
    pub loaded_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(robots: ParsedRobots) -> Self {
        Self {
            robots,
            loaded_at: Utc::now(),
        }
    }

    /// True once the entry is older than `ROBOTS_TTL_HOURS`
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now - self.loaded_at > Duration::hours(ROBOTS_TTL_HOURS)
    }

    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        self.robots.is_allowed(url, user_agent)
    }

    /// Crawl-delay of the group matching `user_agent`, capped at
    /// `MAX_CRAWL_DELAY_SECS`
    pub fn crawl_delay(&self, user_agent: &str) -> Option<std::time::Duration> {
        self.robots
            .crawl_delay(user_agent)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| secs.min(MAX_CRAWL_DELAY_SECS))
            .and_then(|secs| std::time::Duration::try_from_secs_f64(secs).ok())
    }

    /// `Sitemap:` URLs declared by the file
    pub fn sitemaps(&self) -> Vec<String> {
        self.robots.sitemaps()
    }
}

//! Crawler module for page fetching and task execution
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with fingerprint rotation and retry
//! - Per-domain politeness (robots.txt, crawl-delay, delay ranges, slots)
//! - Task scheduling over a bounded worker pool

mod fetcher;
mod politeness;
mod retry;
mod scheduler;

pub use fetcher::{
    build_http_client, FetchClient, FetchError, FetchResponse, FetchSettings, Fingerprint,
};
pub use politeness::{DomainPermit, PolitenessGate, PolitenessPolicy};
pub use retry::RetryPolicy;
pub use scheduler::{TaskEvent, TaskHandle, TaskScheduler};

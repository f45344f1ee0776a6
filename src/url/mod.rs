//! URL handling module for Sitemap-Harvest
//!
//! This module provides URL normalization for identity checks (the sitemap
//! visited set and page deduplication) and domain extraction for the
//! per-domain politeness registry.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{extract_domain, robots_url};
pub use normalize::{normalize_url, resolve_loc};

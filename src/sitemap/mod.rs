//! Sitemap handling module
//!
//! This module expands sitemaps and sitemap indexes into page URLs:
//! - Gzip detection by content signature and bounded decompression
//! - Namespace-agnostic `urlset` / `sitemapindex` parsing
//! - Iterative expansion with cycle, depth and URL-count limits
//! - Sitemap discovery from robots.txt and well-known paths

mod parser;
mod resolver;

pub use parser::{
    decompress_if_gzipped, parse_sitemap, SitemapDocument, SitemapEntry, MAX_DECOMPRESSED_SIZE,
    MAX_LOCS_PER_DOCUMENT,
};
pub use resolver::{BranchError, Resolution, SitemapResolver, WELL_KNOWN_SITEMAPS};

use crate::crawler::FetchError;
use thiserror::Error;

/// Failure to load one sitemap document
#[derive(Debug, Clone, Error)]
pub enum SitemapError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Malformed sitemap {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("Failed to decompress {url}: {message}")]
    Decompress { url: String, message: String },

    #[error("Sitemap {url} exceeds the decompressed size limit")]
    TooLarge { url: String },

    #[error("Politeness gate refused {url}: {message}")]
    Gate { url: String, message: String },
}

/// Page status definitions and the per-page record
///
/// A page is created `pending` when its URL is enqueued, moves to `fetching`
/// when a worker takes it, and ends in exactly one terminal status.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Represents the current status of a page within a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    // ===== Active States =====
    /// Page is enqueued and waiting for a worker
    Pending,

    /// A worker is fetching and extracting the page
    Fetching,

    // ===== Terminal States =====
    /// Page was fetched and its document handed to the sink
    Parsed,

    /// Fetch, extraction hand-off, or storage failed
    Error,

    /// robots.txt disallows the page; it was never fetched
    Forbidden,
}

impl PageStatus {
    /// Returns true if this is a terminal status (no further processing)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Parsed | Self::Error | Self::Forbidden)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Parsed => "parsed",
            Self::Error => "error",
            Self::Forbidden => "forbidden",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "fetching" => Some(Self::Fetching),
            "parsed" => Some(Self::Parsed),
            "error" => Some(Self::Error),
            "forbidden" => Some(Self::Forbidden),
            _ => None,
        }
    }

    /// Returns all page statuses
    pub fn all() -> [Self; 5] {
        [
            Self::Pending,
            Self::Fetching,
            Self::Parsed,
            Self::Error,
            Self::Forbidden,
        ]
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A page URL tracked by a task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// Owning task
    pub task_id: Uuid,

    /// Absolute URL as discovered in the sitemap
    pub url: String,

    pub status: PageStatus,

    /// Last HTTP status code received, if any
    pub http_status: Option<u16>,

    /// When the last fetch attempt finished
    pub fetched_at: Option<DateTime<Utc>>,

    /// Retries spent on the last fetch (attempts - 1)
    pub retry_count: u32,

    /// Last error message for `error` and `forbidden` pages
    pub error: Option<String>,

    /// `<lastmod>` from the sitemap entry, verbatim
    pub lastmod: Option<String>,
}

impl Page {
    /// Creates a pending page for `task_id`
    pub fn pending(task_id: Uuid, url: impl Into<String>, lastmod: Option<String>) -> Self {
        Self {
            task_id,
            url: url.into(),
            status: PageStatus::Pending,
            http_status: None,
            fetched_at: None,
            retry_count: 0,
            error: None,
            lastmod,
        }
    }
}

/// A page status transition, as published on the task event stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageEvent {
    pub task_id: Uuid,
    pub url: String,
    pub status: PageStatus,
    pub http_status: Option<u16>,
    pub at: DateTime<Utc>,
}

impl From<&Page> for PageEvent {
    fn from(page: &Page) -> Self {
        Self {
            task_id: page.task_id,
            url: page.url.clone(),
            status: page.status,
            http_status: page.http_status,
            at: Utc::now(),
        }
    }
}

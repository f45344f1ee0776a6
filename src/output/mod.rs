//! Output module for reporting task results
//!
//! This module handles:
//! - One-line progress summaries for logs
//! - Statistics over persisted tasks, pages and documents

pub mod stats;

pub use stats::{load_latest_statistics, load_statistics, print_statistics, TaskStatistics};

use crate::state::TaskProgress;

/// Formats a progress snapshot as a single log line
///
/// # Example
///
/// ```
/// use sitemap_harvest::output::format_progress;
/// use sitemap_harvest::TaskProgress;
/// use uuid::Uuid;
///
/// let mut progress = TaskProgress::new(Uuid::nil());
/// progress.total = 4;
/// progress.processed = 1;
/// progress.succeeded = 1;
/// assert_eq!(
///     format_progress(&progress),
///     "scheduled: 1/4 processed (25.0%), 1 parsed, 0 failed, 0 forbidden"
/// );
/// ```
pub fn format_progress(progress: &TaskProgress) -> String {
    format!(
        "{}: {}/{} processed ({:.1}%), {} parsed, {} failed, {} forbidden",
        progress.status,
        progress.processed,
        progress.total,
        progress.completion() * 100.0,
        progress.succeeded,
        progress.failed,
        progress.forbidden
    )
}

//! Statistics generation from the task database
//!
//! This module provides functionality for extracting and displaying
//! task statistics from the storage layer, including the forbidden and
//! error page lists used to diagnose failures.

use crate::state::{Page, PageStatus};
use crate::storage::{Storage, TaskRecord};
use crate::Result;
use uuid::Uuid;

/// Statistics of one task
#[derive(Debug, Clone)]
pub struct TaskStatistics {
    /// The task row, with its last recorded counters
    pub task: TaskRecord,

    /// Count of pages by status, in `PageStatus::all()` order; zero counts
    /// are omitted
    pub pages_by_status: Vec<(PageStatus, u64)>,

    /// Documents written by the task
    pub documents: u64,

    /// Pages disallowed by robots.txt
    pub forbidden_pages: Vec<Page>,

    /// Pages that ended in error, with their messages
    pub error_pages: Vec<Page>,
}

impl TaskStatistics {
    /// Number of pages recorded for the task
    pub fn total_pages(&self) -> u64 {
        self.pages_by_status.iter().map(|(_, count)| count).sum()
    }

    pub fn count(&self, status: PageStatus) -> u64 {
        self.pages_by_status
            .iter()
            .find(|(s, _)| *s == status)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

/// Loads statistics of a task from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `task_id` - The task to report on
pub fn load_statistics(storage: &dyn Storage, task_id: Uuid) -> Result<TaskStatistics> {
    let task = storage.get_task(task_id)?;

    let mut pages_by_status = Vec::new();
    for status in PageStatus::all() {
        let count = storage.count_pages_by_status(task_id, status)?;
        if count > 0 {
            pages_by_status.push((status, count));
        }
    }

    Ok(TaskStatistics {
        task,
        pages_by_status,
        documents: storage.count_documents(task_id)?,
        forbidden_pages: storage.get_pages_by_status(task_id, PageStatus::Forbidden)?,
        error_pages: storage.get_pages_by_status(task_id, PageStatus::Error)?,
    })
}

/// Loads statistics of the most recent task, if any
pub fn load_latest_statistics(storage: &dyn Storage) -> Result<Option<TaskStatistics>> {
    match storage.get_latest_task()? {
        Some(task) => load_statistics(storage, task.progress.task_id).map(Some),
        None => Ok(None),
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &TaskStatistics) {
    let progress = &stats.task.progress;

    println!("=== Task Statistics ===\n");

    println!("Task:");
    println!("  ID: {}", progress.task_id);
    println!("  Status: {}", progress.status);
    println!("  Created: {}", stats.task.created_at);
    println!("  Updated: {}", stats.task.updated_at);
    if let Some(error) = &progress.error {
        println!("  Error: {}", error);
    }
    println!();

    println!("Progress:");
    println!("  {}", super::format_progress(progress));
    println!("  Documents stored: {}", stats.documents);
    println!();

    let total = stats.total_pages();
    println!("Pages by Status:");
    for (status, count) in &stats.pages_by_status {
        let percentage = if total > 0 {
            (*count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    if !stats.forbidden_pages.is_empty() {
        println!("Forbidden Pages ({}):", stats.forbidden_pages.len());
        for page in &stats.forbidden_pages {
            println!("  - {}", page.url);
        }
        println!();
    }

    if !stats.error_pages.is_empty() {
        println!("Error Pages ({}):", stats.error_pages.len());
        for page in &stats.error_pages {
            let status = page
                .http_status
                .map(|s| format!("HTTP {}", s))
                .unwrap_or_else(|| "no response".to_string());
            println!(
                "  - {} [{}, {} retries]: {}",
                page.url,
                status,
                page.retry_count,
                page.error.as_deref().unwrap_or("unknown error")
            );
        }
        println!();
    }

    let parsed = stats.count(PageStatus::Parsed);
    let success_rate = if total > 0 {
        (parsed as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} pages parsed)",
        success_rate, parsed, total
    );
}

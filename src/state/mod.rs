//! State module for tracking task progress
//!
//! This module provides state management for tasks, pages and domains.
//!
//! # Components
//!
//! - `PageStatus` / `Page`: the status and record of individual pages
//! - `TaskStatus` / `TaskProgress`: the task lifecycle and its counters
//! - `DomainState`: per-domain slots, request spacing and robots.txt cache

mod domain_state;
mod page_state;
mod task_state;

// Re-export main types
pub use domain_state::{time_until_next_request, DomainState};
pub use page_state::{Page, PageEvent, PageStatus};
pub use task_state::{TaskProgress, TaskStatus};

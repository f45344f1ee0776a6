//! Storage module for persisting task output
//!
//! This module handles everything downstream of extraction:
//! - The `ResultSink` trait the scheduler writes to
//! - Duplicate handling for documents of already-seen URLs
//! - An in-memory sink and a SQLite-backed sink
//! - Task, page and document queries for reporting

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemorySink;
pub use sqlite::{SqliteSink, SqliteStorage};
pub use traits::{
    DuplicateStrategy, ResultSink, Storage, StorageError, StorageResult, StoreOutcome,
};

use crate::state::TaskProgress;

/// A persisted task
#[derive(Debug, Clone)]
pub struct TaskRecord {
    /// Last recorded snapshot
    pub progress: TaskProgress,
    pub created_at: String,
    pub updated_at: String,
}

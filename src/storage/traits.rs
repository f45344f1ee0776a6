//! Storage traits and error types
//!
//! `ResultSink` is the boundary the task scheduler writes to. `Storage` is
//! the query interface of persistent backends; `SqliteSink` adapts one to
//! the other.

use crate::extract::ExtractedDocument;
use crate::state::{Page, PageStatus, TaskProgress};
use crate::storage::TaskRecord;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// What to do with a document whose URL already has a stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateStrategy {
    /// Keep the stored document and drop the new one
    Ignore,
    /// Overwrite the stored document, bumping its version
    #[default]
    Update,
    /// Keep every document as a separate version
    Version,
}

impl DuplicateStrategy {
    /// Decides the outcome for a new document given the latest stored
    /// version for its URL
    pub fn outcome(&self, latest_version: Option<u32>) -> StoreOutcome {
        match (latest_version, self) {
            (None, _) => StoreOutcome::Inserted,
            (Some(_), Self::Ignore) => StoreOutcome::Ignored,
            (Some(v), Self::Update) => StoreOutcome::Updated { version: v + 1 },
            (Some(v), Self::Version) => StoreOutcome::Versioned { version: v + 1 },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Update => "update",
            Self::Version => "version",
        }
    }
}

/// What a sink did with a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// First document for the URL, stored as version 1
    Inserted,
    /// A document already existed and the new one was dropped
    Ignored,
    /// The existing document was overwritten
    Updated { version: u32 },
    /// Stored next to the existing versions
    Versioned { version: u32 },
}

impl StoreOutcome {
    /// Version number written, if anything was written
    pub fn version(&self) -> Option<u32> {
        match self {
            Self::Inserted => Some(1),
            Self::Ignored => None,
            Self::Updated { version } | Self::Versioned { version } => Some(*version),
        }
    }
}

/// Receives the output of running tasks
///
/// Implementations are shared by every worker of a task and must be safe
/// to call concurrently. Only `store_document` failures affect page status;
/// failures to record pages or progress are logged by the scheduler.
pub trait ResultSink: Send + Sync {
    /// Persists one extracted document, applying the sink's duplicate strategy
    fn store_document(&self, document: ExtractedDocument) -> StorageResult<StoreOutcome>;

    /// Records the current state of a page
    fn record_page(&self, _page: &Page) -> StorageResult<()> {
        Ok(())
    }

    /// Records a task progress snapshot
    fn record_progress(&self, _progress: &TaskProgress) -> StorageResult<()> {
        Ok(())
    }
}

/// Trait for persistent storage backends
pub trait Storage {
    // ===== Task Management =====

    /// Inserts or updates a task row from a progress snapshot
    fn upsert_task(&mut self, progress: &TaskProgress) -> StorageResult<()>;

    /// Gets a task by ID
    fn get_task(&self, task_id: Uuid) -> StorageResult<TaskRecord>;

    /// Gets the most recently created task
    fn get_latest_task(&self) -> StorageResult<Option<TaskRecord>>;

    // ===== Page Management =====

    /// Inserts or updates a page, keyed by task and URL
    fn upsert_page(&mut self, page: &Page) -> StorageResult<()>;

    /// Gets a page of a task by URL
    fn get_page(&self, task_id: Uuid, url: &str) -> StorageResult<Option<Page>>;

    /// Gets all pages of a task in a specific status
    fn get_pages_by_status(&self, task_id: Uuid, status: PageStatus) -> StorageResult<Vec<Page>>;

    /// Counts pages of a task in a specific status
    fn count_pages_by_status(&self, task_id: Uuid, status: PageStatus) -> StorageResult<u64>;

    // ===== Document Management =====

    /// Stores a document according to `strategy`
    fn store_document(
        &mut self,
        document: &ExtractedDocument,
        strategy: DuplicateStrategy,
    ) -> StorageResult<StoreOutcome>;

    /// Gets the highest version stored for a URL
    fn get_latest_document(&self, url: &str) -> StorageResult<Option<ExtractedDocument>>;

    /// Gets every stored version for a URL, oldest first
    fn get_document_versions(&self, url: &str) -> StorageResult<Vec<ExtractedDocument>>;

    /// Counts documents written by a task
    fn count_documents(&self, task_id: Uuid) -> StorageResult<u64>;
}

//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait
//! and `SqliteSink`, the `ResultSink` used by the command-line runner.

use crate::extract::ExtractedDocument;
use crate::state::{Page, PageStatus, TaskProgress, TaskStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    DuplicateStrategy, ResultSink, Storage, StorageError, StorageResult, StoreOutcome,
};
use crate::storage::TaskRecord;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn latest_version(&self, url: &str) -> StorageResult<Option<(i64, u32)>> {
        let latest = self
            .conn
            .query_row(
                "SELECT id, version FROM documents WHERE url = ?1 ORDER BY version DESC LIMIT 1",
                params![url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(latest)
    }
}

const TASK_COLUMNS: &str = "id, status, total, processed, succeeded, failed, forbidden,
     error_message, created_at, updated_at";

const PAGE_COLUMNS: &str =
    "task_id, url, status, http_status, fetched_at, retry_count, error_message, lastmod";

const DOCUMENT_COLUMNS: &str = "task_id, url, version, fields, rule_errors, extracted_at";

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let status: String = row.get(1)?;
    Ok(TaskRecord {
        progress: TaskProgress {
            task_id: uuid_column(row, 0)?,
            status: TaskStatus::from_db_string(&status).unwrap_or(TaskStatus::Error),
            total: row.get::<_, i64>(2)? as u64,
            processed: row.get::<_, i64>(3)? as u64,
            succeeded: row.get::<_, i64>(4)? as u64,
            failed: row.get::<_, i64>(5)? as u64,
            forbidden: row.get::<_, i64>(6)? as u64,
            error: row.get(7)?,
        },
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<Page> {
    let status: String = row.get(2)?;
    Ok(Page {
        task_id: uuid_column(row, 0)?,
        url: row.get(1)?,
        status: PageStatus::from_db_string(&status).unwrap_or(PageStatus::Error),
        http_status: row.get(3)?,
        fetched_at: timestamp_column(row, 4)?,
        retry_count: row.get(5)?,
        error: row.get(6)?,
        lastmod: row.get(7)?,
    })
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<ExtractedDocument> {
    Ok(ExtractedDocument {
        task_id: uuid_column(row, 0)?,
        url: row.get(1)?,
        version: row.get(2)?,
        fields: json_column(row, 3)?,
        errors: json_column(row, 4)?,
        extracted_at: timestamp_column(row, 5)?.unwrap_or_else(Utc::now),
    })
}

impl Storage for SqliteStorage {
    // ===== Task Management =====

    fn upsert_task(&mut self, progress: &TaskProgress) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO tasks (id, status, total, processed, succeeded, failed, forbidden,
                                error_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                total = excluded.total,
                processed = excluded.processed,
                succeeded = excluded.succeeded,
                failed = excluded.failed,
                forbidden = excluded.forbidden,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at",
            params![
                progress.task_id.to_string(),
                progress.status.to_db_string(),
                progress.total as i64,
                progress.processed as i64,
                progress.succeeded as i64,
                progress.failed as i64,
                progress.forbidden as i64,
                progress.error,
                now,
            ],
        )?;
        Ok(())
    }

    fn get_task(&self, task_id: Uuid) -> StorageResult<TaskRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                params![task_id.to_string()],
                task_from_row,
            )
            .optional()?
            .ok_or(StorageError::TaskNotFound(task_id))
    }

    fn get_latest_task(&self) -> StorageResult<Option<TaskRecord>> {
        let task = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM tasks ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    TASK_COLUMNS
                ),
                [],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    // ===== Page Management =====

    fn upsert_page(&mut self, page: &Page) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO pages (task_id, url, status, http_status, fetched_at, retry_count,
                                error_message, lastmod)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(task_id, url) DO UPDATE SET
                status = excluded.status,
                http_status = excluded.http_status,
                fetched_at = excluded.fetched_at,
                retry_count = excluded.retry_count,
                error_message = excluded.error_message,
                lastmod = excluded.lastmod",
            params![
                page.task_id.to_string(),
                page.url,
                page.status.to_db_string(),
                page.http_status,
                page.fetched_at.map(|t| t.to_rfc3339()),
                page.retry_count,
                page.error,
                page.lastmod,
            ],
        )?;
        Ok(())
    }

    fn get_page(&self, task_id: Uuid, url: &str) -> StorageResult<Option<Page>> {
        let page = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM pages WHERE task_id = ?1 AND url = ?2",
                    PAGE_COLUMNS
                ),
                params![task_id.to_string(), url],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    fn get_pages_by_status(&self, task_id: Uuid, status: PageStatus) -> StorageResult<Vec<Page>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM pages WHERE task_id = ?1 AND status = ?2 ORDER BY id",
            PAGE_COLUMNS
        ))?;

        let pages = stmt
            .query_map(
                params![task_id.to_string(), status.to_db_string()],
                page_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(pages)
    }

    fn count_pages_by_status(&self, task_id: Uuid, status: PageStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE task_id = ?1 AND status = ?2",
            params![task_id.to_string(), status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Document Management =====

    fn store_document(
        &mut self,
        document: &ExtractedDocument,
        strategy: DuplicateStrategy,
    ) -> StorageResult<StoreOutcome> {
        let latest = self.latest_version(&document.url)?;
        let outcome = strategy.outcome(latest.map(|(_, version)| version));

        let fields = serde_json::to_string(&document.fields)?;
        let errors = serde_json::to_string(&document.errors)?;
        let extracted_at = document.extracted_at.to_rfc3339();
        let task_id = document.task_id.to_string();

        match (outcome, latest) {
            (StoreOutcome::Ignored, _) => {}
            (StoreOutcome::Updated { version }, Some((row_id, _))) => {
                self.conn.execute(
                    "UPDATE documents
                     SET task_id = ?1, version = ?2, fields = ?3, rule_errors = ?4,
                         extracted_at = ?5
                     WHERE id = ?6",
                    params![task_id, version, fields, errors, extracted_at, row_id],
                )?;
            }
            (outcome, _) => {
                let version = outcome.version().unwrap_or(1);
                self.conn.execute(
                    "INSERT INTO documents (task_id, url, version, fields, rule_errors, extracted_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![task_id, document.url, version, fields, errors, extracted_at],
                )?;
            }
        }

        Ok(outcome)
    }

    fn get_latest_document(&self, url: &str) -> StorageResult<Option<ExtractedDocument>> {
        let document = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM documents WHERE url = ?1 ORDER BY version DESC LIMIT 1",
                    DOCUMENT_COLUMNS
                ),
                params![url],
                document_from_row,
            )
            .optional()?;
        Ok(document)
    }

    fn get_document_versions(&self, url: &str) -> StorageResult<Vec<ExtractedDocument>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM documents WHERE url = ?1 ORDER BY version",
            DOCUMENT_COLUMNS
        ))?;

        let documents = stmt
            .query_map(params![url], document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(documents)
    }

    fn count_documents(&self, task_id: Uuid) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE task_id = ?1",
            params![task_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// A `ResultSink` persisting into SQLite
pub struct SqliteSink {
    storage: Mutex<SqliteStorage>,
    strategy: DuplicateStrategy,
}

impl SqliteSink {
    pub fn new(storage: SqliteStorage, strategy: DuplicateStrategy) -> Self {
        Self {
            storage: Mutex::new(storage),
            strategy,
        }
    }

    /// Runs `f` with exclusive access to the underlying storage
    pub fn with_storage<T>(
        &self,
        f: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut storage = self.storage.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&mut storage)
    }
}

impl ResultSink for SqliteSink {
    fn store_document(&self, document: ExtractedDocument) -> StorageResult<StoreOutcome> {
        self.with_storage(|storage| storage.store_document(&document, self.strategy))
    }

    fn record_page(&self, page: &Page) -> StorageResult<()> {
        self.with_storage(|storage| storage.upsert_page(page))
    }

    fn record_progress(&self, progress: &TaskProgress) -> StorageResult<()> {
        self.with_storage(|storage| storage.upsert_task(progress))
    }
}

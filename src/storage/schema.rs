//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sitemap-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per task, updated on every progress snapshot
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    total INTEGER NOT NULL DEFAULT 0,
    processed INTEGER NOT NULL DEFAULT 0,
    succeeded INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    forbidden INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Every page enqueued by a task, kept for audit
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id TEXT NOT NULL REFERENCES tasks(id),
    url TEXT NOT NULL,
    status TEXT NOT NULL,
    http_status INTEGER,
    fetched_at TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    lastmod TEXT,
    UNIQUE(task_id, url)
);

CREATE INDEX IF NOT EXISTS idx_pages_task_status ON pages(task_id, status);

-- Extracted documents; several versions per URL under the version strategy
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id TEXT NOT NULL REFERENCES tasks(id),
    url TEXT NOT NULL,
    version INTEGER NOT NULL,
    fields TEXT NOT NULL,
    rule_errors TEXT NOT NULL,
    extracted_at TEXT NOT NULL,
    UNIQUE(url, version)
);

CREATE INDEX IF NOT EXISTS idx_documents_url ON documents(url);
CREATE INDEX IF NOT EXISTS idx_documents_task ON documents(task_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

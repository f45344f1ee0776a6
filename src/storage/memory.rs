use crate::extract::ExtractedDocument;
use crate::state::{Page, TaskProgress};
use crate::storage::traits::{
    DuplicateStrategy, ResultSink, StorageError, StorageResult, StoreOutcome,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// An in-memory `ResultSink`
///
/// Useful for embedding the scheduler without a database and for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    strategy: DuplicateStrategy,
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Versions per URL, oldest first
    documents: HashMap<String, Vec<ExtractedDocument>>,
    pages: HashMap<(Uuid, String), Page>,
    progress: HashMap<Uuid, Vec<TaskProgress>>,
}

impl MemorySink {
    pub fn new(strategy: DuplicateStrategy) -> Self {
        Self {
            strategy,
            inner: Mutex::default(),
        }
    }

    fn state(&self) -> StorageResult<MutexGuard<'_, MemoryState>> {
        self.inner.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Latest document stored for `url`
    pub fn document(&self, url: &str) -> Option<ExtractedDocument> {
        let state = self.state().ok()?;
        state.documents.get(url).and_then(|v| v.last().cloned())
    }

    /// Every stored version for `url`, oldest first
    pub fn versions(&self, url: &str) -> Vec<ExtractedDocument> {
        self.state()
            .ok()
            .and_then(|state| state.documents.get(url).cloned())
            .unwrap_or_default()
    }

    /// Number of URLs with at least one document
    pub fn document_count(&self) -> usize {
        self.state().map(|state| state.documents.len()).unwrap_or(0)
    }

    /// Last recorded state of a page
    pub fn page(&self, task_id: Uuid, url: &str) -> Option<Page> {
        let state = self.state().ok()?;
        state.pages.get(&(task_id, url.to_string())).cloned()
    }

    /// Every progress snapshot recorded for a task, in order
    pub fn progress_history(&self, task_id: Uuid) -> Vec<TaskProgress> {
        self.state()
            .ok()
            .and_then(|state| state.progress.get(&task_id).cloned())
            .unwrap_or_default()
    }
}

impl ResultSink for MemorySink {
    fn store_document(&self, mut document: ExtractedDocument) -> StorageResult<StoreOutcome> {
        let mut state = self.state()?;
        let versions = state.documents.entry(document.url.clone()).or_default();
        let outcome = self
            .strategy
            .outcome(versions.last().map(|doc| doc.version));

        match outcome {
            StoreOutcome::Ignored => {}
            StoreOutcome::Updated { version } => {
                document.version = version;
                versions.pop();
                versions.push(document);
            }
            StoreOutcome::Inserted | StoreOutcome::Versioned { .. } => {
                document.version = outcome.version().unwrap_or(1);
                versions.push(document);
            }
        }

        Ok(outcome)
    }

    fn record_page(&self, page: &Page) -> StorageResult<()> {
        let mut state = self.state()?;
        state
            .pages
            .insert((page.task_id, page.url.clone()), page.clone());
        Ok(())
    }

    fn record_progress(&self, progress: &TaskProgress) -> StorageResult<()> {
        let mut state = self.state()?;
        state
            .progress
            .entry(progress.task_id)
            .or_default()
            .push(progress.clone());
        Ok(())
    }
}

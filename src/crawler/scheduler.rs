//! Task scheduling and the task state machine
//!
//! This module handles:
//! - Task creation and validation
//! - The `scheduled -> running <-> paused -> stopped` lifecycle
//! - A bounded worker pool racing over a shared pending-page queue
//! - Page status and progress counter updates under one lock
//! - The page and progress event stream
//!
//! Pause and stop are cooperative: workers observe them between pages, and
//! an in-flight fetch always finishes and records its result.

use crate::config::{validate_rules, validate_task_config, TaskConfig};
use crate::ConfigError;
use crate::crawler::fetcher::{FetchClient, FetchSettings};
use crate::crawler::politeness::{PolitenessGate, PolitenessPolicy};
use crate::extract::{extract, ExtractedDocument, Rule};
use crate::sitemap::{Resolution, SitemapResolver};
use crate::state::{Page, PageEvent, PageStatus, TaskProgress, TaskStatus};
use crate::storage::ResultSink;
use crate::url::extract_domain;
use crate::{HarvestError, Result};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use url::Url;
use uuid::Uuid;

/// An event published by a running task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A page changed status
    Page(PageEvent),
    /// The task changed status or enqueued its pages
    Progress(TaskProgress),
}

/// Creates tasks sharing one politeness gate, HTTP client and sink
pub struct TaskScheduler {
    gate: Arc<PolitenessGate>,
    client: FetchClient,
    sink: Arc<dyn ResultSink>,
    events: Option<mpsc::UnboundedSender<TaskEvent>>,
}

impl TaskScheduler {
    pub fn new(gate: Arc<PolitenessGate>, client: FetchClient, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            gate,
            client,
            sink,
            events: None,
        }
    }

    /// Publishes the events of every task created afterwards on `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<TaskEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn gate(&self) -> &Arc<PolitenessGate> {
        &self.gate
    }

    /// Creates a task in the `scheduled` state
    ///
    /// The configuration and rules are validated here; nothing is fetched
    /// until `TaskHandle::start`.
    pub fn schedule(&self, config: TaskConfig, rules: Vec<Rule>) -> Result<TaskHandle> {
        validate_task_config(&config)?;
        validate_rules(&rules)?;
        self.check_shared_limits(&config)?;
        let root = Url::parse(&config.sitemap_url)?;

        let id = Uuid::new_v4();
        let progress = TaskProgress::new(id);
        let (signal, _) = watch::channel(TaskStatus::Scheduled);
        let (finished, _) = watch::channel(false);

        let inner = Arc::new(TaskInner {
            id,
            root,
            settings: FetchSettings::from_task_config(&config),
            policy: PolitenessPolicy::from_task_config(&config),
            config,
            rules,
            gate: self.gate.clone(),
            client: self.client.clone(),
            sink: self.sink.clone(),
            events: self.events.clone(),
            state: Mutex::new(TaskState {
                progress: progress.clone(),
                pages: Vec::new(),
                pending: VecDeque::new(),
            }),
            signal,
            finished,
        });

        tracing::info!("Scheduled task {} for {}", id, inner.root);
        inner.publish_progress(&progress);

        Ok(TaskHandle { inner })
    }

    /// Rejects per-task settings that only the shared gate and client can
    /// apply, when they differ from what those were built with
    fn check_shared_limits(&self, config: &TaskConfig) -> std::result::Result<(), ConfigError> {
        let slots = self.gate.per_domain_concurrency();
        if config.per_domain_concurrency as usize != slots {
            return Err(ConfigError::Validation(format!(
                "per_domain_concurrency {} differs from the shared politeness gate ({})",
                config.per_domain_concurrency, slots
            )));
        }

        if let Some(limit) = self.client.max_redirects() {
            if config.max_redirects != limit {
                return Err(ConfigError::Validation(format!(
                    "max_redirects {} differs from the shared HTTP client ({})",
                    config.max_redirects, limit
                )));
            }
        }

        Ok(())
    }
}

/// Handle to a task; clones refer to the same task
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<TaskInner>,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.state().progress.status
    }

    /// Current progress snapshot
    pub fn progress(&self) -> TaskProgress {
        self.inner.state().progress.clone()
    }

    /// Every page of the task, in enqueue order
    pub fn pages(&self) -> Vec<Page> {
        self.inner.state().pages.clone()
    }

    pub fn pages_with_status(&self, status: PageStatus) -> Vec<Page> {
        self.inner
            .state()
            .pages
            .iter()
            .filter(|page| page.status == status)
            .cloned()
            .collect()
    }

    /// Starts the task: resolves the sitemap, enqueues its pages and spins up
    /// the worker pool in the background
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.inner.transition(TaskStatus::Running, None)?;
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.drive().await });
        Ok(())
    }

    /// Stops dispatching new pages; in-flight pages finish
    pub fn pause(&self) -> Result<TaskProgress> {
        self.inner.transition(TaskStatus::Paused, None)
    }

    /// Continues dispatching from the first pending page
    pub fn resume(&self) -> Result<TaskProgress> {
        self.inner.transition(TaskStatus::Running, None)
    }

    /// Stops the task for good
    ///
    /// Pending pages are dropped from the queue and stay `pending`; in-flight
    /// pages finish.
    pub fn stop(&self) -> Result<TaskProgress> {
        self.inner.transition(TaskStatus::Stopped, None)
    }

    /// True once the task's driver has returned
    pub fn is_finished(&self) -> bool {
        *self.inner.finished.borrow()
    }

    /// Waits until the task's driver has returned and every worker is done
    ///
    /// Never returns for a task that was not started.
    pub async fn wait(&self) -> TaskProgress {
        let mut finished = self.inner.finished.subscribe();
        if finished.wait_for(|done| *done).await.is_err() {
            tracing::debug!("Task {} dropped its completion signal", self.inner.id);
        }
        self.progress()
    }
}

struct TaskState {
    progress: TaskProgress,
    /// Never shrinks; terminal pages are kept for audit
    pages: Vec<Page>,
    /// Indexes into `pages`, in dispatch order
    pending: VecDeque<usize>,
}

struct TaskInner {
    id: Uuid,
    root: Url,
    config: TaskConfig,
    rules: Vec<Rule>,
    settings: FetchSettings,
    policy: PolitenessPolicy,
    gate: Arc<PolitenessGate>,
    client: FetchClient,
    sink: Arc<dyn ResultSink>,
    events: Option<mpsc::UnboundedSender<TaskEvent>>,
    state: Mutex<TaskState>,
    /// Current status, republished on every transition
    signal: watch::Sender<TaskStatus>,
    finished: watch::Sender<bool>,
}

enum Dispatch {
    Page(usize, String),
    Wait,
    Done,
}

/// Result of processing one page
struct PageOutcome {
    status: PageStatus,
    http_status: Option<u16>,
    retry_count: u32,
    error: Option<String>,
    fetched: bool,
}

impl PageOutcome {
    fn failed(error: impl ToString) -> Self {
        Self {
            status: PageStatus::Error,
            http_status: None,
            retry_count: 0,
            error: Some(error.to_string()),
            fetched: false,
        }
    }
}

impl TaskInner {
    fn state(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies a status transition, rejecting illegal ones
    fn transition(&self, to: TaskStatus, error: Option<String>) -> Result<TaskProgress> {
        let mut state = self.state();
        let from = state.progress.status;
        if !from.can_transition_to(to) {
            return Err(HarvestError::InvalidTransition { from, to });
        }

        state.progress.status = to;
        if error.is_some() {
            state.progress.error = error;
        }

        let drained = if to == TaskStatus::Stopped {
            let drained = state.pending.len();
            state.pending.clear();
            drained
        } else {
            0
        };

        let snapshot = state.progress.clone();
        drop(state);

        tracing::info!("Task {}: {} -> {}", self.id, from, to);
        if drained > 0 {
            tracing::info!("Task {}: dropped {} pending pages", self.id, drained);
        }

        self.signal.send_replace(to);
        self.publish_progress(&snapshot);
        Ok(snapshot)
    }

    async fn drive(self: Arc<Self>) {
        match self.resolve().await {
            Ok(resolution) => {
                for branch in &resolution.branch_errors {
                    tracing::warn!(
                        "Task {}: sitemap branch {} (depth {}) failed: {}",
                        self.id,
                        branch.url,
                        branch.depth,
                        branch.error
                    );
                }
                if !self.enqueue(resolution) {
                    tracing::info!("Task {} ended before its pages were enqueued", self.id);
                    self.finish();
                    return;
                }
            }
            Err(e) => {
                tracing::error!("Task {} failed: {}", self.id, e);
                if let Err(err) = self.transition(TaskStatus::Error, Some(e.to_string())) {
                    tracing::debug!("Task {}: {}", self.id, err);
                }
                self.finish();
                return;
            }
        }

        let mut workers = JoinSet::new();
        for worker in 0..self.config.concurrency.max(1) {
            let inner = self.clone();
            workers.spawn(async move { inner.work(worker).await });
        }

        let mut worker_failure = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Task {}: worker failed: {}", self.id, e);
                worker_failure = Some(e.to_string());
            }
        }

        if let Some(reason) = worker_failure {
            self.fail_orphaned(&reason);
        }

        self.settle().await;
        self.finish();
    }

    async fn resolve(&self) -> Result<Resolution> {
        let resolver = SitemapResolver::new(self.client.clone(), self.settings.clone())
            .follow_nested(self.config.follow_nested)
            .with_politeness(self.gate.clone(), self.policy.clone())
            .with_control(self.signal.subscribe());

        if self.config.discover {
            resolver
                .resolve_site(
                    &self.root,
                    &self.gate,
                    self.config.max_depth,
                    self.config.max_pages,
                )
                .await
        } else {
            resolver
                .resolve(&self.root, self.config.max_depth, self.config.max_pages)
                .await
        }
    }

    /// Adds every resolved page as `pending`
    ///
    /// Returns false when the task already reached a terminal status.
    fn enqueue(&self, resolution: Resolution) -> bool {
        let mut state = self.state();
        if state.progress.status.is_terminal() {
            return false;
        }

        let mut created = Vec::with_capacity(resolution.entries.len());
        for entry in resolution.entries.into_iter().take(self.config.max_pages) {
            let page = Page::pending(self.id, entry.loc.to_string(), entry.lastmod);
            let index = state.pages.len();
            created.push(page.clone());
            state.pages.push(page);
            state.pending.push_back(index);
        }
        state.progress.total = state.pages.len() as u64;
        let snapshot = state.progress.clone();
        drop(state);

        tracing::info!("Task {}: enqueued {} pages", self.id, created.len());
        for page in &created {
            if let Err(e) = self.sink.record_page(page) {
                tracing::warn!("Task {}: failed to record {}: {}", self.id, page.url, e);
            }
        }
        self.publish_progress(&snapshot);
        true
    }

    /// Takes the next pending page, or tells the worker to wait or exit
    fn next_dispatch(&self) -> Dispatch {
        let mut state = self.state();
        match state.progress.status {
            TaskStatus::Running => {
                let Some(index) = state.pending.pop_front() else {
                    return Dispatch::Done;
                };
                let page = &mut state.pages[index];
                page.status = PageStatus::Fetching;
                Dispatch::Page(index, page.url.clone())
            }
            TaskStatus::Scheduled | TaskStatus::Paused => Dispatch::Wait,
            TaskStatus::Stopped | TaskStatus::Completed | TaskStatus::Error => Dispatch::Done,
        }
    }

    async fn work(&self, worker: u32) {
        let mut signal = self.signal.subscribe();

        loop {
            match self.next_dispatch() {
                Dispatch::Page(index, url) => {
                    tracing::debug!("Task {} worker {}: {}", self.id, worker, url);
                    self.page_changed(index);
                    let outcome = self.process(&url).await;
                    self.complete_page(index, outcome);
                }
                Dispatch::Wait => {
                    if signal.changed().await.is_err() {
                        break;
                    }
                }
                Dispatch::Done => break,
            }
        }

        tracing::trace!("Task {} worker {} exiting", self.id, worker);
    }

    /// Robots check, authorization, fetch, extraction and hand-off of one page
    async fn process(&self, page_url: &str) -> PageOutcome {
        let url = match Url::parse(page_url) {
            Ok(url) => url,
            Err(e) => return PageOutcome::failed(e),
        };

        if self.policy.respect_robots && !self.gate.is_allowed(&url, &self.policy.robots_agent).await
        {
            return PageOutcome {
                status: PageStatus::Forbidden,
                http_status: None,
                retry_count: 0,
                error: Some(
                    HarvestError::PolicyDenied {
                        url: page_url.to_string(),
                    }
                    .to_string(),
                ),
                fetched: false,
            };
        }

        let Some(domain) = extract_domain(&url) else {
            return PageOutcome::failed(crate::UrlError::MissingDomain);
        };

        let permit = match self.gate.authorize(&domain, &self.policy).await {
            Ok(permit) => permit,
            Err(e) => return PageOutcome::failed(e),
        };
        let gate: &PolitenessGate = &self.gate;
        let policy = &self.policy;
        let domain = domain.as_str();
        let fetched = self
            .client
            .fetch_paced(&url, &self.settings, move |_| gate.pace(domain, policy))
            .await;
        drop(permit);

        let response = match fetched {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Task {}: {}", self.id, e);
                return PageOutcome {
                    status: PageStatus::Error,
                    http_status: e.status(),
                    retry_count: e.attempts().saturating_sub(1),
                    error: Some(e.to_string()),
                    fetched: true,
                };
            }
        };

        let extraction = extract(&response.text(), &self.rules);
        for warning in &extraction.warnings {
            tracing::debug!("Task {}: {}: {}", self.id, page_url, warning);
        }
        let document = ExtractedDocument::new(self.id, page_url, extraction);

        let (status, error) = match self.sink.store_document(document) {
            Ok(outcome) => {
                tracing::trace!("Task {}: stored {} ({:?})", self.id, page_url, outcome);
                (PageStatus::Parsed, None)
            }
            Err(e) => {
                tracing::warn!("Task {}: failed to store {}: {}", self.id, page_url, e);
                (
                    PageStatus::Error,
                    Some(format!("Failed to store document: {}", e)),
                )
            }
        };

        PageOutcome {
            status,
            http_status: Some(response.status),
            retry_count: response.attempts.saturating_sub(1),
            error,
            fetched: true,
        }
    }

    /// Records a page's terminal status and its counter in one critical
    /// section
    fn complete_page(&self, index: usize, outcome: PageOutcome) {
        let (page, progress) = {
            let mut state = self.state();
            let page = &mut state.pages[index];
            page.status = outcome.status;
            page.http_status = outcome.http_status;
            page.retry_count = outcome.retry_count;
            page.error = outcome.error;
            if outcome.fetched {
                page.fetched_at = Some(Utc::now());
            }
            let page = page.clone();
            state.progress.record(page.status);
            (page, state.progress.clone())
        };

        match page.status {
            PageStatus::Forbidden => tracing::info!("Forbidden by robots.txt: {}", page.url),
            PageStatus::Error => tracing::warn!(
                "Failed {}: {}",
                page.url,
                page.error.as_deref().unwrap_or("unknown error")
            ),
            _ => tracing::debug!("Parsed {}", page.url),
        }

        self.publish_page(&page);
        if let Err(e) = self.sink.record_progress(&progress) {
            tracing::warn!("Task {}: failed to record progress: {}", self.id, e);
        }
    }

    /// Fails every page left `fetching` by a worker that did not return
    ///
    /// Called once all workers are joined, so no live worker owns such a
    /// page.
    fn fail_orphaned(&self, reason: &str) {
        let orphaned: Vec<usize> = self
            .state()
            .pages
            .iter()
            .enumerate()
            .filter(|(_, page)| page.status == PageStatus::Fetching)
            .map(|(index, _)| index)
            .collect();

        for index in orphaned {
            self.complete_page(index, PageOutcome::failed(format!("worker failed: {}", reason)));
        }
    }

    /// Publishes the current state of a page that just changed
    fn page_changed(&self, index: usize) {
        let page = self.state().pages[index].clone();
        self.publish_page(&page);
    }

    fn publish_page(&self, page: &Page) {
        if let Some(events) = &self.events {
            let _ = events.send(TaskEvent::Page(PageEvent::from(page)));
        }
        if let Err(e) = self.sink.record_page(page) {
            tracing::warn!("Task {}: failed to record {}: {}", self.id, page.url, e);
        }
    }

    fn publish_progress(&self, progress: &TaskProgress) {
        if let Some(events) = &self.events {
            let _ = events.send(TaskEvent::Progress(progress.clone()));
        }
        if let Err(e) = self.sink.record_progress(progress) {
            tracing::warn!("Task {}: failed to record progress: {}", self.id, e);
        }
    }

    /// Completes the task once all workers are gone
    ///
    /// A task paused after its last page finished stays paused until it is
    /// resumed (then completes) or stopped.
    async fn settle(&self) {
        let mut signal = self.signal.subscribe();

        loop {
            let (status, unfinished) = {
                let state = self.state();
                let unfinished = state
                    .pages
                    .iter()
                    .filter(|page| !page.status.is_terminal())
                    .count();
                (state.progress.status, unfinished)
            };
            match status {
                TaskStatus::Running if unfinished > 0 => {
                    let message = format!(
                        "{} pages left unprocessed after worker failures",
                        unfinished
                    );
                    tracing::error!("Task {}: {}", self.id, message);
                    if let Err(e) = self.transition(TaskStatus::Error, Some(message)) {
                        tracing::debug!("Task {}: {}", self.id, e);
                    }
                    return;
                }
                TaskStatus::Running => match self.transition(TaskStatus::Completed, None) {
                    Ok(progress) => {
                        tracing::info!(
                            "Task {} completed: {} parsed, {} failed, {} forbidden",
                            self.id,
                            progress.succeeded,
                            progress.failed,
                            progress.forbidden
                        );
                        return;
                    }
                    Err(e) => tracing::debug!("Task {}: {}", self.id, e),
                },
                TaskStatus::Scheduled | TaskStatus::Paused => {
                    if signal.changed().await.is_err() {
                        return;
                    }
                }
                TaskStatus::Stopped | TaskStatus::Completed | TaskStatus::Error => return,
            }
        }
    }

    fn finish(&self) {
        self.finished.send_replace(true);
    }
}

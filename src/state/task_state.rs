/// Task lifecycle states and progress counters
///
/// ```text
/// scheduled -> running <-> paused -> stopped
///              running -> completed
///              running -> error
///              running -> stopped
/// ```
use crate::state::PageStatus;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Scheduled,
    Running,
    Paused,
    Stopped,
    Completed,
    Error,
}

impl TaskStatus {
    /// Returns true once the task can no longer change status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Error)
    }

    /// Returns true if moving from `self` to `to` is a legal transition
    ///
    /// `paused -> error` is accepted because a pause can arrive while the
    /// root sitemap is still being resolved.
    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Scheduled, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Stopped)
                | (Paused, Stopped)
                | (Running, Completed)
                | (Running, Error)
                | (Paused, Error)
        )
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "stopped" => Some(Self::Stopped),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Snapshot of a task's status and counters
///
/// `processed` always equals `succeeded + failed + forbidden`; the scheduler
/// updates counters and page statuses under the same lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    pub task_id: Uuid,
    pub status: TaskStatus,
    /// Pages enqueued from the sitemap
    pub total: u64,
    /// Pages that reached a terminal status
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub forbidden: u64,
    /// Reason for the `error` status
    pub error: Option<String>,
}

impl TaskProgress {
    /// Creates an empty snapshot for a freshly scheduled task
    pub fn new(task_id: Uuid) -> Self {
        Self {
            task_id,
            status: TaskStatus::Scheduled,
            total: 0,
            processed: 0,
            succeeded: 0,
            failed: 0,
            forbidden: 0,
            error: None,
        }
    }

    /// Counts a page that just reached the terminal `status`
    ///
    /// Non-terminal statuses are ignored.
    pub fn record(&mut self, status: PageStatus) {
        match status {
            PageStatus::Parsed => self.succeeded += 1,
            PageStatus::Error => self.failed += 1,
            PageStatus::Forbidden => self.forbidden += 1,
            PageStatus::Pending | PageStatus::Fetching => return,
        }
        self.processed += 1;
    }

    /// Pages not yet in a terminal status
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.processed)
    }

    /// Fraction of enqueued pages that are done, in `0.0..=1.0`
    pub fn completion(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.processed as f64 / self.total as f64
    }
}

use crate::robots::CachedRobots;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{AcquireError, Mutex, OwnedSemaphorePermit, Semaphore};

/// Tracks the politeness state of one domain
///
/// One instance exists per domain key for the lifetime of the politeness
/// gate, shared by every worker of every task. It holds the concurrency
/// slots, the time of the last granted request and the cached robots.txt.
#[derive(Debug)]
pub struct DomainState {
    /// Per-domain concurrency slots
    slots: Arc<Semaphore>,

    /// Timestamp of the last granted request; the lock serializes grants
    last_request_time: Mutex<Option<Instant>>,

    /// Cached robots.txt; the lock serializes first-contact fetches
    robots: Mutex<Option<CachedRobots>>,

    /// Number of requests granted for this domain
    request_count: AtomicU64,
}

impl DomainState {
    /// Creates a new DomainState allowing `max_concurrent` requests in flight
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            last_request_time: Mutex::new(None),
            robots: Mutex::new(None),
            request_count: AtomicU64::new(0),
        }
    }

    /// Waits for a free concurrency slot
    ///
    /// The slot is released when the returned permit is dropped.
    pub async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.slots.clone().acquire_owned().await
    }

    /// Number of concurrency slots currently free
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Waits until `interval` has elapsed since the previous grant, then
    /// records a new request
    ///
    /// Grants are serialized: a second caller waits for the first one to be
    /// granted before computing its own wait.
    pub async fn wait_for_turn(&self, interval: Duration) {
        let mut last = self.last_request_time.lock().await;

        if let Some(wait) = time_until_next_request(*last, interval, Instant::now()) {
            tracing::trace!("Waiting {:?} before next request", wait);
            tokio::time::sleep(wait).await;
        }

        *last = Some(Instant::now());
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of requests granted so far
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Cached robots.txt slot for this domain
    pub fn robots(&self) -> &Mutex<Option<CachedRobots>> {
        &self.robots
    }
}

/// Calculates the time until the next request can be made
///
/// Returns None if a request can be made now, or the duration to wait
/// otherwise.
pub fn time_until_next_request(
    last: Option<Instant>,
    interval: Duration,
    now: Instant,
) -> Option<Duration> {
    let last = last?;
    let elapsed = now.saturating_duration_since(last);
    if elapsed < interval {
        Some(interval - elapsed)
    } else {
        None
    }
}

//! Settlement Scheduler
//!
//! Tracks when pending wagers expire and drives their resolution.
//!
//! Provides:
//! - A min-heap of due times so the run loop always sleeps until the next
//!   expiry instead of polling
//! - Wakeups when a wager is scheduled ahead of the current deadline
//! - Retry with exponential backoff when a wager cannot be resolved yet
//! - A swappable `Clock` so tests drive time by hand

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::services::{TradeError, TradingService};

/// Base retry delay after a deferred settlement.
const RETRY_BASE_MS: i64 = 1_000;
/// Retry delay ceiling.
const RETRY_CAP_MS: i64 = 30_000;
/// Sleep used when the queue is empty.
const IDLE_SLEEP_MS: u64 = 60_000;

/// Millisecond clock. Swappable so tests control time.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock (for testing).
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::Relaxed);
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::Relaxed)
    }
}

/// One queued expiry. Ordered by due time, then id for determinism.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct DueEntry {
    due_at_ms: i64,
    wager_id: String,
    attempt: u32,
}

/// Schedules wager expiries and resolves them when due.
pub struct SettlementScheduler {
    /// Pending expiries, earliest on top via `Reverse`.
    queue: Mutex<BinaryHeap<Reverse<DueEntry>>>,
    /// Wakes the run loop when a new deadline lands.
    notify: Notify,
    /// Clock used for all deadline math.
    clock: Arc<dyn Clock>,
}

impl SettlementScheduler {
    /// Create a scheduler on the system clock.
    pub fn new() -> Arc<Self> {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a scheduler with a custom clock (for testing).
    pub fn with_clock(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            clock,
        })
    }

    /// Register a wager for resolution at `due_at_ms`. Deadlines in the past
    /// are picked up on the next loop pass.
    pub fn schedule(&self, wager_id: impl Into<String>, due_at_ms: i64) {
        let mut queue = self.queue.lock().unwrap();
        queue.push(Reverse(DueEntry {
            due_at_ms,
            wager_id: wager_id.into(),
            attempt: 0,
        }));
        drop(queue);
        self.notify.notify_one();
    }

    /// Number of queued expiries.
    pub fn pending_count(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Earliest queued deadline, if any.
    pub fn next_due_at(&self) -> Option<i64> {
        self.queue
            .lock()
            .unwrap()
            .peek()
            .map(|Reverse(entry)| entry.due_at_ms)
    }

    /// Resolve every entry whose deadline has passed. Deferred wagers are
    /// re-queued with backoff; everything else leaves the queue for good.
    /// Returns how many entries reached a terminal answer.
    pub fn settle_due(&self, trading: &TradingService) -> usize {
        let now = self.clock.now_ms();
        let mut resolved = 0;

        loop {
            let entry = {
                let mut queue = self.queue.lock().unwrap();
                match queue.peek() {
                    Some(Reverse(entry)) if entry.due_at_ms <= now => {
                        queue.pop().map(|Reverse(entry)| entry)
                    }
                    _ => None,
                }
            };
            let Some(entry) = entry else {
                break;
            };

            match trading.settle_wager(&entry.wager_id) {
                Ok(_) => resolved += 1,
                Err(TradeError::ResolutionDeferred(reason)) => {
                    let delay = retry_delay_ms(entry.attempt);
                    warn!(
                        "Settlement of wager {} deferred ({}), retrying in {}ms",
                        entry.wager_id, reason, delay
                    );
                    let mut queue = self.queue.lock().unwrap();
                    queue.push(Reverse(DueEntry {
                        due_at_ms: now + delay,
                        wager_id: entry.wager_id,
                        attempt: entry.attempt + 1,
                    }));
                }
                Err(e) => {
                    error!("Settlement of wager {} failed: {}", entry.wager_id, e);
                }
            }
        }

        resolved
    }

    /// Run the scheduler loop: settle everything due, then sleep until the
    /// next deadline or until a new registration wakes us.
    pub async fn run(self: Arc<Self>, trading: Arc<TradingService>) {
        info!("Settlement scheduler started");

        loop {
            self.settle_due(&trading);

            let wait = match self.next_due_at() {
                Some(due_at) => {
                    let remaining = due_at - self.clock.now_ms();
                    Duration::from_millis(remaining.max(0) as u64)
                }
                None => Duration::from_millis(IDLE_SLEEP_MS),
            };

            tokio::select! {
                _ = sleep(wait) => {}
                _ = self.notify.notified() => {}
            }
        }
    }
}

/// Delay before retry `attempt + 1`: base doubling per attempt, capped.
fn retry_delay_ms(attempt: u32) -> i64 {
    let shift = attempt.min(16);
    (RETRY_BASE_MS << shift).min(RETRY_CAP_MS)
}

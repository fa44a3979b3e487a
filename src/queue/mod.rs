//! Outbound resilience queue.
//!
//! Messages that reached no peer, or that the caller wants delivered at
//! least once, wait here in one global FIFO. A retry pass walks the queue
//! front to back and stops at the first failed attempt, so a later message
//! is never delivered ahead of an earlier one. An entry that fails
//! `max_attempts` times becomes [`EntryStatus::Failed`] and its receipt
//! resolves with [`QueueError::Exhausted`].

mod entry;
mod worker;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};

pub use entry::{DeliveryReceipt, EntryId, EntryStatus, QueueEntry};
pub use worker::RetryWorker;

use crate::config::duration_ms;
use crate::core::{QueueError, MAX_DELIVERY_ATTEMPTS, MAX_QUEUE_ENTRIES, RETRY_INTERVAL};
use entry::Outcome;

/// Something that can deliver an encoded message.
pub trait Dispatch: Send + Sync + 'static {
    /// Deliver `payload`, returning how many peers received it.
    fn dispatch(&self, payload: &[u8]) -> impl Future<Output = usize> + Send;
}

/// Queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity; enqueue fails beyond it.
    pub max_entries: usize,
    /// Delivery attempts before an entry fails permanently.
    pub max_attempts: u32,
    /// Period of the background retry pass.
    #[serde(rename = "retry_interval_ms", with = "duration_ms")]
    pub retry_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_entries: MAX_QUEUE_ENTRIES,
            max_attempts: MAX_DELIVERY_ATTEMPTS,
            retry_interval: RETRY_INTERVAL,
        }
    }
}

impl QueueConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.max_entries == 0 {
            return Err("queue max_entries must be positive".to_string());
        }
        if self.max_attempts == 0 {
            return Err("queue max_attempts must be positive".to_string());
        }
        if self.retry_interval.is_zero() {
            return Err("queue retry interval must be positive".to_string());
        }
        Ok(())
    }
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Entries accepted.
    pub enqueued: u64,
    /// Entries delivered.
    pub completed: u64,
    /// Entries that exhausted their attempts.
    pub exhausted: u64,
    /// Failed delivery attempts.
    pub failed_attempts: u64,
}

/// Result of one retry pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Entries delivered.
    pub completed: Vec<EntryId>,
    /// Entry whose attempt failed and stopped the pass, if any.
    pub failed: Option<EntryId>,
    /// Entries that became permanently failed.
    pub exhausted: Vec<EntryId>,
}

struct Slot {
    entry: QueueEntry,
    receipt: Option<oneshot::Sender<Outcome>>,
}

impl Slot {
    fn settle(&mut self, status: EntryStatus, outcome: Outcome) {
        self.entry.status = status;
        if let Some(tx) = self.receipt.take() {
            let _ = tx.send(outcome);
        }
    }
}

#[derive(Default)]
struct Inner {
    slots: VecDeque<Slot>,
    closed: bool,
    stats: QueueStats,
}

/// Global FIFO of undelivered messages.
///
/// Any number of tasks may enqueue concurrently. Retry passes are
/// serialized.
pub struct OutboundQueue {
    config: QueueConfig,
    inner: Mutex<Inner>,
    pass: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
    wake: Notify,
}

impl std::fmt::Debug for OutboundQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundQueue")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl OutboundQueue {
    /// Empty queue.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
            pass: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(1),
            wake: Notify::new(),
        }
    }

    /// Settings in effect.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an encoded message.
    pub fn enqueue(&self, payload: Vec<u8>) -> Result<(EntryId, DeliveryReceipt), QueueError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(QueueError::Closed);
        }
        if inner.slots.len() >= self.config.max_entries {
            warn!(capacity = self.config.max_entries, "outbound queue full, rejecting message");
            return Err(QueueError::Full(self.config.max_entries));
        }

        let id = EntryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, receipt) = DeliveryReceipt::new(id);
        debug!(entry = %id, bytes = payload.len(), queued = inner.slots.len() + 1, "message queued");
        inner.slots.push_back(Slot {
            entry: QueueEntry::new(id, payload),
            receipt: Some(tx),
        });
        inner.stats.enqueued += 1;
        Ok((id, receipt))
    }

    /// Ask the retry worker to run a pass now.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub(crate) async fn woken(&self) {
        self.wake.notified().await;
    }

    /// Entries not yet terminal, front first.
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.lock().slots.iter().map(|s| s.entry.clone()).collect()
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lifetime counters.
    pub fn stats(&self) -> QueueStats {
        self.lock().stats
    }

    /// Attempt delivery of queued entries in order.
    ///
    /// The pass ends when the queue is empty or an attempt fails. The lock
    /// is not held while `dispatcher` runs, so enqueues proceed meanwhile.
    pub async fn retry_pass<D: Dispatch>(&self, dispatcher: &D) -> PassReport {
        let _pass = self.pass.lock().await;
        let mut report = PassReport::default();

        loop {
            let (id, payload) = {
                let mut inner = self.lock();
                let Some(front) = inner.slots.front_mut() else {
                    break;
                };
                front.entry.status = EntryStatus::Sending;
                (front.entry.id, front.entry.payload.clone())
            };

            let delivered = dispatcher.dispatch(&payload).await;

            let mut inner = self.lock();
            let Some(position) = inner.slots.iter().position(|s| s.entry.id == id) else {
                // Closed while the attempt was in flight.
                break;
            };

            if delivered > 0 {
                if let Some(mut slot) = inner.slots.remove(position) {
                    slot.settle(EntryStatus::Completed, Ok(delivered));
                }
                inner.stats.completed += 1;
                debug!(entry = %id, peers = delivered, "queued message delivered");
                report.completed.push(id);
                continue;
            }

            inner.stats.failed_attempts += 1;
            let max_attempts = self.config.max_attempts;
            let retries = {
                let slot = &mut inner.slots[position];
                slot.entry.retries += 1;
                slot.entry.retries
            };

            if retries >= max_attempts {
                if let Some(mut slot) = inner.slots.remove(position) {
                    slot.settle(
                        EntryStatus::Failed,
                        Err(QueueError::Exhausted {
                            entry: id.0,
                            attempts: retries,
                        }),
                    );
                }
                inner.stats.exhausted += 1;
                warn!(entry = %id, attempts = retries, "queued message exhausted delivery attempts");
                report.exhausted.push(id);
            } else {
                inner.slots[position].entry.status = EntryStatus::Pending;
                debug!(entry = %id, retries, "queued message not delivered, will retry");
            }
            report.failed = Some(id);
            break;
        }

        report
    }

    /// Put any entry left mid-attempt by a cancelled pass back to pending.
    pub(crate) fn requeue_in_flight(&self) {
        for slot in self.lock().slots.iter_mut() {
            if slot.entry.status == EntryStatus::Sending {
                slot.entry.status = EntryStatus::Pending;
            }
        }
    }

    /// Reject further enqueues and resolve every outstanding receipt with
    /// [`QueueError::Closed`].
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        let abandoned = inner.slots.len();
        for mut slot in inner.slots.drain(..) {
            slot.settle(EntryStatus::Failed, Err(QueueError::Closed));
        }
        if abandoned > 0 {
            info!(abandoned, "outbound queue closed with undelivered messages");
        }
        self.wake.notify_waiters();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

//! Queue entries and delivery receipts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::core::QueueError;

/// Queue entry identifier, increasing in enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry-{}", self.0)
    }
}

/// Delivery state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Waiting for the next retry pass.
    Pending,
    /// A delivery attempt is in flight.
    Sending,
    /// Attempts exhausted. Terminal.
    Failed,
    /// Delivered to at least one peer. Terminal.
    Completed,
}

impl EntryStatus {
    /// Whether the entry will never be attempted again.
    pub fn is_terminal(self) -> bool {
        matches!(self, EntryStatus::Failed | EntryStatus::Completed)
    }
}

/// One encoded message awaiting delivery.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    /// Identifier.
    pub id: EntryId,
    /// Encoded message.
    #[serde(skip)]
    pub payload: Vec<u8>,
    /// Enqueue time.
    pub created: DateTime<Utc>,
    /// Failed delivery attempts so far.
    pub retries: u32,
    /// Current status.
    pub status: EntryStatus,
}

impl QueueEntry {
    pub(crate) fn new(id: EntryId, payload: Vec<u8>) -> Self {
        Self {
            id,
            payload,
            created: Utc::now(),
            retries: 0,
            status: EntryStatus::Pending,
        }
    }
}

pub(crate) type Outcome = Result<usize, QueueError>;

/// Resolves once the entry reaches a terminal state.
///
/// Dropping the receipt does not cancel delivery.
#[derive(Debug)]
pub struct DeliveryReceipt {
    id: EntryId,
    rx: oneshot::Receiver<Outcome>,
}

impl DeliveryReceipt {
    pub(crate) fn new(id: EntryId) -> (oneshot::Sender<Outcome>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { id, rx })
    }

    /// Entry this receipt tracks.
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Wait for the outcome: the number of peers the message reached, or
    /// the terminal failure.
    pub async fn wait(self) -> Result<usize, QueueError> {
        self.rx.await.unwrap_or(Err(QueueError::Closed))
    }

    /// Outcome if already decided.
    pub fn try_outcome(&mut self) -> Option<Result<usize, QueueError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(QueueError::Closed)),
        }
    }
}

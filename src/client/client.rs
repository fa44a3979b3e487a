//! The assembled client.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::codec::{encode, Category, Event};
use crate::core::{ConfigError, QueueError};
use crate::federation::{BroadcastReport, FederationManager, PeerConfig, PeerId, PeerStatus};
use crate::queue::{DeliveryReceipt, EntryId, OutboundQueue, QueueStats, RetryWorker};
use crate::router::{EventRouter, FilterId, FilterRule, RouterStats, Subscription};

/// What happened to a message handed to [`CotClient::send`].
#[derive(Debug)]
pub enum SendOutcome {
    /// Reached at least one peer immediately.
    Delivered(BroadcastReport),
    /// No peer was reachable; the message waits in the outbound queue.
    Queued {
        /// Queue entry.
        entry: EntryId,
        /// Resolves when the entry completes or fails permanently.
        receipt: DeliveryReceipt,
    },
}

impl SendOutcome {
    /// Whether the message went out immediately.
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered(_))
    }
}

/// Combined counters.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStats {
    /// Router counters.
    pub router: RouterStats,
    /// Queue counters.
    pub queue: QueueStats,
    /// Per-peer state and counters.
    pub peers: Vec<PeerStatus>,
}

/// Cursor-on-Target client: federation, routing and the outbound queue
/// behind one handle.
///
/// Build with [`CotClientBuilder`](super::CotClientBuilder). Feature code
/// subscribes to categories and sends [`Event`]s; it never sees sockets.
///
/// # Example
///
/// ```no_run
/// use cot_protocol::prelude::*;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = CotClientBuilder::new()
///     .local_uid("ANDROID-ops-1")
///     .peer(PeerConfig::new("tak", "tak.example.org", TransportKind::Tls))
///     .build()
///     .await?;
///
/// let mut chat = client.subscribe(Category::Chat);
/// client
///     .send(&Event::chat(ChatDetail::broadcast("ANDROID-ops-1", "OPS", "on station")).build()?)
///     .await?;
///
/// while let Some(routed) = chat.recv().await {
///     println!("{:?} from {:?}", routed.event.detail(), routed.source);
/// }
/// # Ok(())
/// # }
/// ```
pub struct CotClient {
    pub(super) local_uid: String,
    pub(super) router: Arc<EventRouter>,
    pub(super) federation: Arc<FederationManager>,
    pub(super) queue: Arc<OutboundQueue>,
    pub(super) worker: Mutex<Option<RetryWorker>>,
}

impl std::fmt::Debug for CotClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CotClient")
            .field("local_uid", &self.local_uid)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl CotClient {
    /// Uid this client reports as.
    pub fn local_uid(&self) -> &str {
        &self.local_uid
    }

    /// Router, for direct access.
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Federation manager, for direct access.
    pub fn federation(&self) -> &Arc<FederationManager> {
        &self.federation
    }

    /// Outbound queue, for direct access.
    pub fn queue(&self) -> &Arc<OutboundQueue> {
        &self.queue
    }

    /// Start connecting to another peer.
    pub async fn add_peer(&self, config: PeerConfig) -> Result<PeerId, ConfigError> {
        self.federation.add_peer(config).await
    }

    /// Disconnect and forget a peer.
    pub async fn remove_peer(&self, id: PeerId) -> bool {
        self.federation.remove_peer(id).await
    }

    /// State and counters of every peer.
    pub async fn peer_status(&self) -> Vec<PeerStatus> {
        self.federation.peer_status().await
    }

    /// Receive events of one category.
    pub fn subscribe(&self, category: Category) -> Subscription {
        self.router.subscribe(category)
    }

    /// Append a filter rule.
    pub fn add_filter(&self, rule: FilterRule) -> FilterId {
        self.router.add_filter(rule)
    }

    /// Remove a filter rule.
    pub fn remove_filter(&self, id: FilterId) -> bool {
        self.router.remove_filter(id)
    }

    /// Broadcast to every connected peer; queue for retry when none is
    /// connected.
    pub async fn send(&self, event: &Event) -> Result<SendOutcome, QueueError> {
        let payload = encode(event);
        let report = self.federation.broadcast_bytes(&payload).await;
        if report.is_delivered() {
            return Ok(SendOutcome::Delivered(report));
        }

        let (entry, receipt) = self.queue.enqueue(payload)?;
        debug!(uid = event.uid(), %entry, "no peer reachable, message queued");
        Ok(SendOutcome::Queued { entry, receipt })
    }

    /// Queue for at-least-once delivery and attempt it now.
    pub fn send_reliable(&self, event: &Event) -> Result<DeliveryReceipt, QueueError> {
        let (_, receipt) = self.queue.enqueue(encode(event))?;
        self.queue.wake();
        Ok(receipt)
    }

    /// Combined counters.
    pub async fn stats(&self) -> ClientStats {
        ClientStats {
            router: self.router.stats(),
            queue: self.queue.stats(),
            peers: self.federation.peer_status().await,
        }
    }

    /// Stop retrying, disconnect every peer and fail what is still queued.
    pub async fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().await.take() {
            worker.stop().await;
        }
        self.federation.shutdown().await;
        self.queue.close();
        info!(uid = %self.local_uid, "client shut down");
    }
}

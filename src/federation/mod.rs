//! Federation of peer sessions.
//!
//! The [`FederationManager`] is the only writer of the federation table
//! (peer id to session). Readers such as [`broadcast`](FederationManager::broadcast)
//! take a snapshot of the sessions and release the table before doing any
//! I/O.
//!
//! Each peer gets a supervisor task that connects, feeds received bytes
//! through a [`Reassembler`](crate::framing::Reassembler), decodes complete
//! messages, tags them with the peer id and hands them to the
//! [`EventRouter`]. On failure it reconnects with exponential backoff until
//! the peer is removed.

mod backoff;
mod config;
mod peer;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use backoff::Backoff;
pub use config::{OverflowPolicy, PeerConfig, PeerId, ReconnectPolicy};

use crate::codec::{encode, Event};
use crate::core::{ConfigError, IdentityStore};
use crate::queue::Dispatch;
use crate::router::EventRouter;
use crate::transport::{
    CounterSnapshot, SessionId, SessionState, TransportKind, TransportSession,
};
use peer::PeerTask;

struct PeerHandle {
    config: PeerConfig,
    session: TransportSession,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Snapshot of one peer.
#[derive(Debug, Clone, Serialize)]
pub struct PeerStatus {
    /// Peer id.
    pub id: PeerId,
    /// Configured name.
    pub name: String,
    /// Host.
    pub host: String,
    /// Port in use.
    pub port: u16,
    /// Transport.
    pub transport: TransportKind,
    /// Session state.
    pub state: SessionState,
    /// Session counters.
    pub counters: CounterSnapshot,
}

/// Result of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Ready sessions a send was attempted on.
    pub attempted: usize,
    /// Sends that completed.
    pub delivered: usize,
    /// Sends that failed, with the error text.
    pub failed: Vec<(PeerId, String)>,
}

impl BroadcastReport {
    /// Whether at least one peer received the message.
    pub fn is_delivered(&self) -> bool {
        self.delivered > 0
    }
}

/// Owner of every peer session.
pub struct FederationManager {
    peers: RwLock<HashMap<PeerId, PeerHandle>>,
    next_id: AtomicU64,
    router: Arc<EventRouter>,
    identities: Option<Arc<dyn IdentityStore>>,
    reconnect: ReconnectPolicy,
    local_uid: String,
}

impl std::fmt::Debug for FederationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationManager")
            .field("local_uid", &self.local_uid)
            .field("reconnect", &self.reconnect)
            .finish_non_exhaustive()
    }
}

impl FederationManager {
    /// Create an empty federation routing inbound events to `router`.
    ///
    /// `local_uid` is the uid used for keepalive pings and must not be
    /// blank; `reconnect` must have a positive initial delay.
    pub fn new(
        router: Arc<EventRouter>,
        identities: Option<Arc<dyn IdentityStore>>,
        reconnect: ReconnectPolicy,
        local_uid: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let local_uid = local_uid.into();
        if local_uid.trim().is_empty() {
            return Err(ConfigError::Invalid("local_uid is empty".to_string()));
        }
        reconnect.validate().map_err(ConfigError::Invalid)?;

        Ok(Self {
            peers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            router,
            identities,
            reconnect,
            local_uid,
        })
    }

    /// Validate `config`, add the peer and start connecting to it.
    pub async fn add_peer(&self, config: PeerConfig) -> Result<PeerId, ConfigError> {
        config.validate().map_err(ConfigError::Invalid)?;
        let id = PeerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = TransportSession::new(SessionId(id.0));
        let (shutdown, shutdown_rx) = oneshot::channel();

        let task = PeerTask {
            id,
            config: config.clone(),
            session: session.clone(),
            router: Arc::clone(&self.router),
            identities: self.identities.clone(),
            reconnect: self.reconnect.clone(),
            local_uid: self.local_uid.clone(),
        };
        let task = tokio::spawn(task.run(shutdown_rx));

        info!(peer = %id, name = %config.name, host = %config.host, port = config.effective_port(), transport = ?config.transport, "peer added");
        self.peers.write().await.insert(
            id,
            PeerHandle {
                config,
                session,
                shutdown,
                task,
            },
        );
        Ok(id)
    }

    /// Stop and discard a peer. Returns whether it existed.
    pub async fn remove_peer(&self, id: PeerId) -> bool {
        let Some(handle) = self.peers.write().await.remove(&id) else {
            return false;
        };
        stop(id, handle).await;
        info!(peer = %id, "peer removed");
        true
    }

    /// Stop every peer.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.peers.write().await.drain().collect();
        for (id, handle) in handles {
            stop(id, handle).await;
        }
    }

    /// Configured peers.
    pub async fn peers(&self) -> Vec<(PeerId, PeerConfig)> {
        let mut peers: Vec<_> = self
            .peers
            .read()
            .await
            .iter()
            .map(|(id, h)| (*id, h.config.clone()))
            .collect();
        peers.sort_by_key(|(id, _)| *id);
        peers
    }

    /// State and counters of every peer.
    pub async fn peer_status(&self) -> Vec<PeerStatus> {
        let mut status: Vec<_> = self
            .peers
            .read()
            .await
            .iter()
            .map(|(id, h)| PeerStatus {
                id: *id,
                name: h.config.name.clone(),
                host: h.config.host.clone(),
                port: h.config.effective_port(),
                transport: h.config.transport,
                state: h.session.state(),
                counters: h.session.counters().snapshot(),
            })
            .collect();
        status.sort_by_key(|s| s.id);
        status
    }

    /// Snapshot of the sessions.
    pub async fn sessions(&self) -> Vec<(PeerId, TransportSession)> {
        self.peers
            .read()
            .await
            .iter()
            .map(|(id, h)| (*id, h.session.clone()))
            .collect()
    }

    /// Number of sessions currently able to send.
    pub async fn ready_count(&self) -> usize {
        self.peers
            .read()
            .await
            .values()
            .filter(|h| h.session.is_ready())
            .count()
    }

    /// Encode `event` once and send it to every ready session.
    pub async fn broadcast(&self, event: &Event) -> BroadcastReport {
        self.broadcast_bytes(&encode(event)).await
    }

    /// Send an encoded message to every ready session concurrently.
    ///
    /// Sessions that are not ready are skipped.
    pub async fn broadcast_bytes(&self, payload: &[u8]) -> BroadcastReport {
        let ready: Vec<_> = self
            .sessions()
            .await
            .into_iter()
            .filter(|(_, s)| s.is_ready())
            .collect();

        let sends = ready.iter().map(|(id, session)| async move {
            (*id, session.send(payload).await)
        });
        let results = join_all(sends).await;

        let mut report = BroadcastReport {
            attempted: results.len(),
            ..Default::default()
        };
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(peer = %id, error = %e, "broadcast send failed");
                    report.failed.push((id, e.to_string()));
                }
            }
        }
        debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            bytes = payload.len(),
            "broadcast"
        );
        report
    }
}

impl Dispatch for FederationManager {
    async fn dispatch(&self, payload: &[u8]) -> usize {
        self.broadcast_bytes(payload).await.delivered
    }
}

async fn stop(id: PeerId, handle: PeerHandle) {
    let _ = handle.shutdown.send(());
    if let Err(e) = handle.task.await {
        warn!(peer = %id, error = %e, "peer supervisor ended abnormally");
    }
    handle.session.close().await;
}

//! Transport session state machine.
//!
//! A [`TransportSession`] owns at most one link at a time. `connect` and
//! `close` are serialized by a transition lock; a second `connect` while one
//! is running fails fast with [`ConnectError::InProgress`]. Received bytes are
//! handed to the caller through the bounded channel in [`Ready`], so
//! backpressure and cancellation are explicit.
//!
//! Every write is bounded by [`SessionConfig::send_timeout`]. A link shutdown
//! signal, raised by `close` or by a fatal write error, aborts an in-flight
//! write and stops the reader, so `close` never waits on a stalled peer.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use super::policy::{TlsPolicy, TransportKind};
use super::socket::{self, Inbound, LinkReader, LinkWriter};
use crate::core::{
    ClientIdentity, ConnectError, SendError, CONNECT_TIMEOUT, INBOUND_CHANNEL_CAPACITY,
    READ_CHUNK_SIZE, SEND_TIMEOUT,
};

/// Capacity of the state-change event stream.
const EVENT_CAPACITY: usize = 32;

/// Session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Host name or address literal.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Transport.
    pub kind: TransportKind,
    /// TLS policy; ignored for TCP and UDP.
    pub tls: TlsPolicy,
    /// Bound on resolve + connect + handshake.
    pub connect_timeout: Duration,
    /// Bound on writing one message. Expiry is fatal to the link.
    pub send_timeout: Duration,
    /// Capacity of the inbound channel returned in [`Ready`].
    pub inbound_capacity: usize,
}

impl SessionConfig {
    /// Configuration with default policy and timeouts.
    pub fn new(host: impl Into<String>, port: u16, kind: TransportKind) -> Self {
        Self {
            host: host.into(),
            port,
            kind,
            tls: TlsPolicy::default(),
            connect_timeout: CONNECT_TIMEOUT,
            send_timeout: SEND_TIMEOUT,
            inbound_capacity: INBOUND_CHANNEL_CAPACITY,
        }
    }

    /// Set the TLS policy.
    pub fn tls(mut self, policy: TlsPolicy) -> Self {
        self.tls = policy;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-message send timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }
}

/// Connection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    /// No link.
    Disconnected,
    /// Connect in progress.
    Connecting,
    /// Link open; sends are accepted.
    Connected,
    /// Connect failed or the link died. Close, then connect again.
    Failed(String),
}

impl SessionState {
    /// Whether the session can carry traffic.
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

/// State-change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connect started.
    Connecting,
    /// Link open.
    Ready,
    /// Connect failed or the link died.
    Failed(String),
    /// Link released by `close`.
    Closed,
}

/// Point-in-time copy of [`SessionCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Bytes written.
    pub bytes_sent: u64,
    /// Bytes read.
    pub bytes_received: u64,
    /// Messages written.
    pub messages_sent: u64,
    /// Messages extracted from received bytes.
    pub messages_received: u64,
    /// Successful connects.
    pub connects: u64,
}

/// Traffic counters, shared with the session reader task.
#[derive(Debug, Default)]
pub struct SessionCounters {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    connects: AtomicU64,
}

impl SessionCounters {
    pub(crate) fn record_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self, bytes: usize) {
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count one message extracted from this session's bytes.
    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
        }
    }
}

/// Returned by a successful connect.
#[derive(Debug)]
pub struct Ready {
    /// Bytes received on the new link, in arrival order. Closes when the
    /// link closes.
    pub inbound: mpsc::Receiver<Inbound>,
    /// Address actually connected to.
    pub peer_addr: SocketAddr,
    /// Transport in use.
    pub kind: TransportKind,
}

struct Shared {
    id: SessionId,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    counters: SessionCounters,
}

impl Shared {
    fn transition(&self, state: SessionState, event: SessionEvent) {
        self.state.send_replace(state);
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Mark a live link as dead. No-op unless currently connected, so a
    /// reader exiting after `close` does not overwrite `Disconnected`.
    fn link_failed(&self, reason: String) {
        let changed = self.state.send_if_modified(|s| {
            if s.is_ready() {
                *s = SessionState::Failed(reason.clone());
                true
            } else {
                false
            }
        });
        if changed {
            warn!(session = %self.id, %reason, "link failed");
            let _ = self.events.send(SessionEvent::Failed(reason));
        }
    }
}

/// Write half of the open link.
struct LinkSlot {
    writer: LinkWriter,
    send_timeout: Duration,
    /// Flips to `true` once the link is being torn down.
    closing: watch::Receiver<bool>,
}

/// One peer connection.
///
/// Cheap to clone; clones share the same link.
#[derive(Clone)]
pub struct TransportSession {
    shared: Arc<Shared>,
    transition: Arc<Mutex<()>>,
    writer: Arc<Mutex<Option<LinkSlot>>>,
    link_shutdown: Arc<Mutex<Option<watch::Sender<bool>>>>,
}

impl fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSession")
            .field("id", &self.shared.id)
            .field("state", &*self.shared.state.borrow())
            .finish_non_exhaustive()
    }
}

impl TransportSession {
    /// Create a disconnected session.
    pub fn new(id: SessionId) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                id,
                state,
                events,
                counters: SessionCounters::default(),
            }),
            transition: Arc::new(Mutex::new(())),
            writer: Arc::new(Mutex::new(None)),
            link_shutdown: Arc::new(Mutex::new(None)),
        }
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    /// Whether sends are currently accepted.
    pub fn is_ready(&self) -> bool {
        self.shared.state.borrow().is_ready()
    }

    /// Watch the state.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Subscribe to state-change events from now on.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Traffic counters.
    pub fn counters(&self) -> &SessionCounters {
        &self.shared.counters
    }

    /// Open the link.
    ///
    /// Fails with [`ConnectError::AlreadyConnected`] while a link is held
    /// (call [`close`](Self::close) first, including after a failure of a
    /// live link) and with [`ConnectError::InProgress`] when another connect
    /// is running. On error the session is left in [`SessionState::Failed`].
    pub async fn connect(
        &self,
        config: &SessionConfig,
        identity: Option<&ClientIdentity>,
    ) -> Result<Ready, ConnectError> {
        let _guard = self
            .transition
            .try_lock()
            .map_err(|_| ConnectError::InProgress)?;
        if self.writer.lock().await.is_some() {
            return Err(ConnectError::AlreadyConnected);
        }

        let id = self.shared.id;
        debug!(session = %id, host = %config.host, port = config.port, kind = ?config.kind, "connecting");
        self.shared
            .transition(SessionState::Connecting, SessionEvent::Connecting);

        let opened = match tokio::time::timeout(
            config.connect_timeout,
            socket::open(config, identity),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ConnectError::Timeout),
        };

        let link = match opened {
            Ok(link) => link,
            Err(e) => {
                warn!(session = %id, host = %config.host, error = %e, "connect failed");
                let reason = e.to_string();
                self.shared.transition(
                    SessionState::Failed(reason.clone()),
                    SessionEvent::Failed(reason),
                );
                return Err(e);
            }
        };

        let (tx, inbound) = mpsc::channel(config.inbound_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.writer.lock().await = Some(LinkSlot {
            writer: link.writer,
            send_timeout: config.send_timeout,
            closing: shutdown_rx.clone(),
        });
        *self.link_shutdown.lock().await = Some(shutdown_tx);
        tokio::spawn(read_loop(
            link.reader,
            tx,
            shutdown_rx,
            Arc::clone(&self.shared),
        ));

        self.shared.counters.connects.fetch_add(1, Ordering::Relaxed);
        self.shared
            .transition(SessionState::Connected, SessionEvent::Ready);
        info!(session = %id, peer = %link.peer_addr, kind = ?config.kind, "connected");

        Ok(Ready {
            inbound,
            peer_addr: link.peer_addr,
            kind: config.kind,
        })
    }

    /// Write one complete message.
    ///
    /// Errors are returned to the caller. A fatal error (see
    /// [`SendError::is_fatal`]), including expiry of the send timeout, marks
    /// the link failed and stops its reader; the owner must `close` and
    /// reconnect. A write interrupted by `close` fails with
    /// [`SendError::NotConnected`].
    pub async fn send(&self, data: &[u8]) -> Result<(), SendError> {
        let mut slot = self.writer.lock().await;
        let link = slot.as_mut().ok_or(SendError::NotConnected)?;
        let mut closing = link.closing.clone();
        let limit = link.send_timeout;

        let result = tokio::select! {
            biased;
            _ = link_closed(&mut closing) => return Err(SendError::NotConnected),
            written = tokio::time::timeout(limit, link.writer.send(data)) => match written {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(SendError::Io(e)),
                Err(_) => Err(SendError::Timeout(limit)),
            },
        };
        // Signalled while the slot is held, so a newer link is never hit.
        if let Err(e) = &result
            && e.is_fatal()
        {
            self.shared.link_failed(e.to_string());
            self.signal_shutdown().await;
        }
        drop(slot);

        result.map(|()| self.shared.counters.record_sent(data.len()))
    }

    /// Release the link. Idempotent.
    ///
    /// Aborts any in-flight write and stops the reader task promptly; the
    /// inbound channel then closes.
    pub async fn close(&self) {
        let _guard = self.transition.lock().await;
        let shutdown = self.link_shutdown.lock().await.take();
        if let Some(shutdown) = &shutdown {
            shutdown.send_replace(true);
        }

        let slot = self.writer.lock().await.take();
        let had_link = slot.is_some();
        if let Some(mut slot) = slot {
            if tokio::time::timeout(slot.send_timeout, slot.writer.shutdown())
                .await
                .is_err()
            {
                debug!(session = %self.shared.id, "link shutdown timed out");
            }
        }

        let was = self.shared.state.send_replace(SessionState::Disconnected);
        if had_link || was != SessionState::Disconnected {
            debug!(session = %self.shared.id, "closed");
            let _ = self.shared.events.send(SessionEvent::Closed);
        }
    }

    /// Raise the link shutdown signal without releasing the link.
    async fn signal_shutdown(&self) {
        if let Some(shutdown) = self.link_shutdown.lock().await.as_ref() {
            shutdown.send_replace(true);
        }
    }
}

/// Resolve once the link shutdown signal is raised or its sender is gone.
async fn link_closed(signal: &mut watch::Receiver<bool>) {
    while !*signal.borrow_and_update() {
        if signal.changed().await.is_err() {
            return;
        }
    }
}

async fn read_loop(
    mut reader: LinkReader,
    tx: mpsc::Sender<Inbound>,
    mut shutdown: watch::Receiver<bool>,
    shared: Arc<Shared>,
) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let chunk = tokio::select! {
            biased;
            _ = link_closed(&mut shutdown) => break,
            read = reader.read(&mut buf) => read,
        };

        let inbound = match chunk {
            Ok(Some(inbound)) => inbound,
            Ok(None) => {
                shared.link_failed("connection closed by peer".to_string());
                break;
            }
            Err(e) => {
                shared.link_failed(e.to_string());
                break;
            }
        };
        shared.counters.record_received(inbound.bytes().len());

        tokio::select! {
            biased;
            _ = link_closed(&mut shutdown) => break,
            sent = tx.send(inbound) => {
                if sent.is_err() {
                    debug!(session = %shared.id, "inbound receiver dropped, reader exiting");
                    break;
                }
            }
        }
    }
}

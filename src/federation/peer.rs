//! Per-peer supervisor task.
//!
//! Owns the peer's reassembler exclusively and drives the session through
//! connect, pump, close and backoff until told to stop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::config::{OverflowPolicy, PeerConfig, PeerId, ReconnectPolicy};
use crate::codec::{decode, encode, Event};
use crate::core::{BufferOverflow, ClientIdentity, IdentityError, IdentityStore};
use crate::framing::Reassembler;
use crate::router::EventRouter;
use crate::transport::{Inbound, Ready, SessionConfig, TransportSession};

/// Everything a supervisor needs.
pub(crate) struct PeerTask {
    pub(crate) id: PeerId,
    pub(crate) config: PeerConfig,
    pub(crate) session: TransportSession,
    pub(crate) router: Arc<EventRouter>,
    pub(crate) identities: Option<Arc<dyn IdentityStore>>,
    pub(crate) reconnect: ReconnectPolicy,
    pub(crate) local_uid: String,
}

/// Why the pump stopped.
#[derive(Debug, PartialEq, Eq)]
enum PumpExit {
    Shutdown,
    Lost,
}

impl PeerTask {
    /// Run until `shutdown` fires or its sender is dropped.
    pub(crate) async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut backoff = Backoff::new(self.reconnect.clone());

        loop {
            let attempt = match self.prepare() {
                Ok((session_config, identity)) => {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        result = self.session.connect(&session_config, identity.as_ref()) => {
                            result.map_err(|e| e.to_string())
                        }
                    }
                }
                Err(e) => Err(e.to_string()),
            };

            match attempt {
                Ok(ready) => {
                    backoff.reset();
                    let exit = self.pump(ready, &mut shutdown).await;
                    self.session.close().await;
                    if exit == PumpExit::Shutdown {
                        break;
                    }
                    info!(peer = %self.id, name = %self.config.name, "connection lost, reconnecting");
                }
                Err(reason) => {
                    debug!(peer = %self.id, name = %self.config.name, %reason, "connect attempt failed");
                }
            }

            let delay = backoff.next_delay();
            debug!(peer = %self.id, failures = backoff.failures(), delay_ms = delay.as_millis() as u64, "waiting to reconnect");
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.session.close().await;
        debug!(peer = %self.id, "supervisor stopped");
    }

    /// Session settings for the next attempt, with identity material and
    /// any trust override from the identity store.
    fn prepare(&self) -> Result<(SessionConfig, Option<ClientIdentity>), IdentityError> {
        let mut session_config = self.config.session_config();
        let Some(name) = &self.config.identity else {
            return Ok((session_config, None));
        };
        let store = self
            .identities
            .as_ref()
            .ok_or_else(|| IdentityError::NotFound(name.clone()))?;

        let identity = store.load_identity(name)?;
        if session_config.tls.pinned_ca_pem.is_none()
            && let Some(ca) = store.trusted_ca(name)
        {
            session_config.tls.pinned_ca_pem = Some(String::from_utf8_lossy(&ca).into_owned());
        }
        Ok((session_config, Some(identity)))
    }

    async fn pump(&self, mut ready: Ready, shutdown: &mut oneshot::Receiver<()>) -> PumpExit {
        let mut reassembler = Reassembler::with_limits(self.config.buffer);

        let keepalive_enabled = self.config.keepalive_interval().is_some();
        let period = self
            .config
            .keepalive_interval()
            .unwrap_or(Duration::from_secs(3600));
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut *shutdown => return PumpExit::Shutdown,

                _ = keepalive.tick(), if keepalive_enabled => {
                    if !self.send_ping().await {
                        return PumpExit::Lost;
                    }
                }

                chunk = ready.inbound.recv() => {
                    let Some(chunk) = chunk else {
                        return PumpExit::Lost;
                    };
                    let result = match chunk {
                        Inbound::Stream(bytes) => {
                            reassembler.feed(&bytes);
                            self.drain(&mut reassembler)
                        }
                        Inbound::Datagram(bytes) => {
                            // Datagrams are framed independently.
                            reassembler.clear();
                            reassembler.feed(&bytes);
                            let result = self.drain(&mut reassembler);
                            reassembler.clear();
                            result
                        }
                    };
                    if let Err(overflow) = result {
                        warn!(peer = %self.id, name = %self.config.name, %overflow, "receive buffer reset");
                        if self.config.overflow == OverflowPolicy::Reconnect {
                            return PumpExit::Lost;
                        }
                    }
                }
            }
        }
    }

    /// Extract, decode and route every complete message.
    fn drain(&self, reassembler: &mut Reassembler) -> Result<(), BufferOverflow> {
        while let Some(message) = reassembler.extract_next()? {
            self.session.counters().record_message_received();
            match decode(&message) {
                Ok(event) => {
                    self.router.route(Some(self.id), event);
                }
                Err(e) => {
                    warn!(
                        peer = %self.id,
                        error = %e,
                        bytes = e.raw().len(),
                        "dropping undecodable message"
                    );
                }
            }
        }
        Ok(())
    }

    /// Returns false when the link should be considered dead.
    async fn send_ping(&self) -> bool {
        let ping = match Event::ping(self.local_uid.clone()).build() {
            Ok(ping) => ping,
            Err(e) => {
                warn!(peer = %self.id, error = %e, "keepalive ping not built");
                return true;
            }
        };
        match self.session.send(&encode(&ping)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(peer = %self.id, error = %e, "keepalive failed");
                !e.is_fatal()
            }
        }
    }
}

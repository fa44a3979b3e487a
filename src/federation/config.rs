//! Per-peer configuration and reconnect policy.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_ms;
use crate::core::{
    CONNECT_TIMEOUT, INITIAL_RECONNECT_DELAY, KEEPALIVE_INTERVAL, MAX_RECONNECT_DELAY,
    RECONNECT_BACKOFF, SEND_TIMEOUT,
};
use crate::framing::ReassemblerLimits;
use crate::transport::{SessionConfig, TlsPolicy, TransportKind};

/// Peer identifier, unique within one [`FederationManager`](super::FederationManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// What to do when a peer's receive buffer overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Log, clear the buffer and keep reading.
    #[default]
    Discard,
    /// Log, then drop the connection and reconnect.
    Reconnect,
}

/// Configuration of one federated peer.
///
/// ```toml
/// [[peers]]
/// name = "tak-east"
/// host = "tak.example.org"
/// transport = "tls"
/// tls = "legacy"
/// identity = "ops-cert"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Display name.
    pub name: String,
    /// Host name or address literal.
    pub host: String,
    /// Port; the transport's conventional port when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Transport.
    #[serde(default)]
    pub transport: TransportKind,
    /// TLS policy, for `transport = "tls"`.
    #[serde(default)]
    pub tls: TlsPolicy,
    /// Name of the client identity in the identity store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Bound on each connect attempt.
    #[serde(
        rename = "connect_timeout_ms",
        with = "duration_ms",
        default = "default_connect_timeout"
    )]
    pub connect_timeout: Duration,
    /// Bound on writing one message; expiry drops the link.
    #[serde(
        rename = "send_timeout_ms",
        with = "duration_ms",
        default = "default_send_timeout"
    )]
    pub send_timeout: Duration,
    /// Keepalive ping interval on stream transports; zero disables.
    #[serde(
        rename = "keepalive_ms",
        with = "duration_ms",
        default = "default_keepalive"
    )]
    pub keepalive: Duration,
    /// Receive buffer overflow handling.
    #[serde(default)]
    pub overflow: OverflowPolicy,
    /// Receive buffer thresholds.
    #[serde(default)]
    pub buffer: ReassemblerLimits,
}

fn default_connect_timeout() -> Duration {
    CONNECT_TIMEOUT
}

fn default_send_timeout() -> Duration {
    SEND_TIMEOUT
}

fn default_keepalive() -> Duration {
    KEEPALIVE_INTERVAL
}

impl PeerConfig {
    /// Peer with default policy, timeouts and port.
    pub fn new(name: impl Into<String>, host: impl Into<String>, transport: TransportKind) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: None,
            transport,
            tls: TlsPolicy::default(),
            identity: None,
            connect_timeout: CONNECT_TIMEOUT,
            send_timeout: SEND_TIMEOUT,
            keepalive: KEEPALIVE_INTERVAL,
            overflow: OverflowPolicy::default(),
            buffer: ReassemblerLimits::default(),
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the TLS policy.
    pub fn with_tls(mut self, policy: TlsPolicy) -> Self {
        self.tls = policy;
        self
    }

    /// Present the named client identity.
    pub fn with_identity(mut self, name: impl Into<String>) -> Self {
        self.identity = Some(name.into());
        self
    }

    /// Set the keepalive interval; zero disables.
    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive = interval;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-message send timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the overflow policy.
    pub fn with_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    /// Port actually used.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.transport.default_port())
    }

    /// Keepalive interval, when enabled for this transport.
    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.transport.is_stream() && !self.keepalive.is_zero()).then_some(self.keepalive)
    }

    /// Transport session settings for this peer.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.host.clone(), self.effective_port(), self.transport)
            .tls(self.tls.clone())
            .connect_timeout(self.connect_timeout)
            .send_timeout(self.send_timeout)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err(format!("peer {:?}: host is empty", self.name));
        }
        if self.port == Some(0) {
            return Err(format!("peer {:?}: port 0", self.name));
        }
        if self.connect_timeout.is_zero() || self.send_timeout.is_zero() {
            return Err(format!("peer {:?}: timeouts must be positive", self.name));
        }
        if self.buffer.high_water > self.buffer.critical {
            return Err(format!(
                "peer {:?}: buffer high_water exceeds critical",
                self.name
            ));
        }
        Ok(())
    }
}

/// Reconnect backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay after the first failure.
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Random extra delay, as a fraction of the current delay (0 disables).
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_RECONNECT_DELAY,
            max_delay: MAX_RECONNECT_DELAY,
            multiplier: f64::from(RECONNECT_BACKOFF),
            jitter: 0.1,
        }
    }
}

impl ReconnectPolicy {
    /// Fixed-interval retry.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_delay: interval,
            max_delay: interval,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.initial_delay.is_zero() {
            return Err("reconnect initial delay must be positive".to_string());
        }
        if self.max_delay < self.initial_delay {
            return Err("reconnect max delay below initial delay".to_string());
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err("reconnect multiplier must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("reconnect jitter must be within 0..=1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_toml() {
        let peer: PeerConfig = toml::from_str(
            r#"
            name = "east"
            host = "tak.example.org"
            transport = "tls"
            "#,
        )
        .unwrap();
        assert_eq!(peer.effective_port(), 8089);
        assert_eq!(peer.tls, TlsPolicy::strict());
        assert_eq!(peer.connect_timeout, CONNECT_TIMEOUT);
        assert_eq!(peer.send_timeout, SEND_TIMEOUT);
        assert_eq!(peer.keepalive_interval(), Some(KEEPALIVE_INTERVAL));
        assert_eq!(peer.overflow, OverflowPolicy::Discard);
        assert!(peer.validate().is_ok());
    }

    #[test]
    fn test_full_toml() {
        let peer: PeerConfig = toml::from_str(
            r#"
            name = "legacy"
            host = "10.0.0.5"
            port = 4242
            transport = "tls"
            tls = "legacy"
            identity = "ops"
            connect_timeout_ms = 2500
            send_timeout_ms = 750
            keepalive_ms = 0
            overflow = "reconnect"

            [buffer]
            high_water = 1000
            critical = 2000
            "#,
        )
        .unwrap();
        assert_eq!(peer.effective_port(), 4242);
        assert_eq!(peer.tls, TlsPolicy::legacy());
        assert_eq!(peer.identity.as_deref(), Some("ops"));
        assert_eq!(peer.connect_timeout, Duration::from_millis(2500));
        assert_eq!(peer.keepalive_interval(), None);
        assert_eq!(peer.overflow, OverflowPolicy::Reconnect);
        assert_eq!(peer.buffer.critical, 2000);

        let session = peer.session_config();
        assert_eq!(session.port, 4242);
        assert_eq!(session.connect_timeout, Duration::from_millis(2500));
        assert_eq!(session.send_timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_udp_has_no_keepalive() {
        let peer = PeerConfig::new("mesh", "239.2.3.1", TransportKind::Udp);
        assert_eq!(peer.effective_port(), 8087);
        assert_eq!(peer.keepalive_interval(), None);
    }

    #[test]
    fn test_validation() {
        assert!(PeerConfig::new("x", " ", TransportKind::Tcp).validate().is_err());
        assert!(PeerConfig::new("x", "h", TransportKind::Tcp)
            .with_port(0)
            .validate()
            .is_err());
        assert!(PeerConfig::new("x", "h", TransportKind::Tcp)
            .with_send_timeout(Duration::ZERO)
            .validate()
            .is_err());

        assert!(ReconnectPolicy::default().validate().is_ok());
        let mut bad = ReconnectPolicy::default();
        bad.multiplier = 0.5;
        assert!(bad.validate().is_err());
        assert!(ReconnectPolicy::fixed(Duration::ZERO).validate().is_err());
    }
}

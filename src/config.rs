//! Client configuration loaded from TOML.
//!
//! ```toml
//! local_uid = "ANDROID-ops-1"
//!
//! [queue]
//! max_attempts = 10
//!
//! [reconnect]
//! initial_delay_ms = 500
//!
//! [[peers]]
//! name = "tak-east"
//! host = "tak.example.org"
//! transport = "tls"
//! tls = "legacy"
//! identity = "ops-cert"
//!
//! [[filters]]
//! action = "suppress"
//! match = "type_prefix"
//! prefix = "b-a"
//! ```
//!
//! Durations are milliseconds.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::ConfigError;
use crate::federation::{PeerConfig, ReconnectPolicy};
use crate::queue::QueueConfig;
use crate::router::{FilterRule, RouterConfig};

/// Everything needed to build a [`CotClient`](crate::client::CotClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Uid this client reports as; used for keepalive pings.
    pub local_uid: String,
    /// Peers to connect to at startup.
    pub peers: Vec<PeerConfig>,
    /// Outbound queue.
    pub queue: QueueConfig,
    /// Router channels.
    pub router: RouterConfig,
    /// Reconnect backoff shared by all peers.
    pub reconnect: ReconnectPolicy,
    /// Filter rules, evaluated after any in `router.filters`.
    pub filters: Vec<FilterRule>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            local_uid: format!("cot-{}", uuid::Uuid::new_v4()),
            peers: Vec::new(),
            queue: QueueConfig::default(),
            router: RouterConfig::default(),
            reconnect: ReconnectPolicy::default(),
            filters: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_uid.trim().is_empty() {
            return Err(ConfigError::Invalid("local_uid is empty".to_string()));
        }
        let mut names = HashSet::new();
        for peer in &self.peers {
            peer.validate().map_err(ConfigError::Invalid)?;
            if !names.insert(peer.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate peer name {:?}",
                    peer.name
                )));
            }
        }
        self.queue.validate().map_err(ConfigError::Invalid)?;
        self.reconnect.validate().map_err(ConfigError::Invalid)?;
        if self.router.subscriber_capacity == 0 {
            return Err(ConfigError::Invalid(
                "router subscriber_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Router settings with the top-level filters appended.
    pub fn router_config(&self) -> RouterConfig {
        let mut router = self.router.clone();
        router.filters.extend(self.filters.iter().cloned());
        router
    }
}

/// `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    use crate::router::{FilterAction, FilterMatch};
    use crate::transport::{TlsProfile, TransportKind};

    const SAMPLE: &str = r#"
        local_uid = "ANDROID-ops-1"

        [queue]
        max_attempts = 10
        retry_interval_ms = 1500

        [router]
        subscriber_capacity = 32

        [reconnect]
        initial_delay_ms = 500
        max_delay_ms = 8000
        jitter = 0.0

        [[peers]]
        name = "tak-east"
        host = "tak.example.org"
        transport = "tls"
        tls = "legacy"
        identity = "ops-cert"

        [[peers]]
        name = "mesh"
        host = "239.2.3.1"
        transport = "udp"

        [[filters]]
        action = "suppress"
        match = "type_prefix"
        prefix = "b-a"
    "#;

    #[test]
    fn test_parse_sample() {
        let config = ClientConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.local_uid, "ANDROID-ops-1");
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.peers[0].tls.profile, TlsProfile::Legacy);
        assert_eq!(config.peers[0].identity.as_deref(), Some("ops-cert"));
        assert_eq!(config.peers[1].transport, TransportKind::Udp);
        assert_eq!(config.queue.max_attempts, 10);
        assert_eq!(config.queue.retry_interval, Duration::from_millis(1500));
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(500));
        assert_eq!(config.reconnect.multiplier, 2.0);

        let router = config.router_config();
        assert_eq!(router.subscriber_capacity, 32);
        assert_eq!(router.filters.len(), 1);
        assert_eq!(router.filters[0].action, FilterAction::Suppress);
        assert_eq!(
            router.filters[0].matcher,
            FilterMatch::TypePrefix {
                prefix: "b-a".to_string()
            }
        );
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert!(config.local_uid.starts_with("cot-"));
        assert!(config.peers.is_empty());
        assert_eq!(config.queue, QueueConfig::default());
    }

    #[test]
    fn test_rejects_invalid_values() {
        let duplicate = r#"
            [[peers]]
            name = "a"
            host = "h1"
            [[peers]]
            name = "a"
            host = "h2"
        "#;
        assert!(matches!(
            ClientConfig::from_toml_str(duplicate),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml_str("[queue]\nmax_entries = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml_str("peers = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let loaded = ClientConfig::load(file.path()).unwrap();

        let text = loaded.to_toml_string().unwrap();
        assert_eq!(ClientConfig::from_toml_str(&text).unwrap(), loaded);

        assert!(matches!(
            ClientConfig::load(file.path().with_extension("missing")),
            Err(ConfigError::Io(_))
        ));
    }
}

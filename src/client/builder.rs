//! Client construction.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use super::CotClient;
use crate::config::ClientConfig;
use crate::core::{ConfigError, IdentityStore};
use crate::federation::{FederationManager, PeerConfig, ReconnectPolicy};
use crate::queue::{OutboundQueue, QueueConfig, RetryWorker};
use crate::router::{EventRouter, FilterRule, RouterConfig};

/// Builder for [`CotClient`].
#[derive(Default)]
pub struct CotClientBuilder {
    config: ClientConfig,
    identities: Option<Arc<dyn IdentityStore>>,
}

impl std::fmt::Debug for CotClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CotClientBuilder")
            .field("config", &self.config)
            .field("identities", &self.identities.is_some())
            .finish()
    }
}

impl CotClientBuilder {
    /// Builder with default settings and no peers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a loaded configuration.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            identities: None,
        }
    }

    /// Set the local uid.
    pub fn local_uid(mut self, uid: impl Into<String>) -> Self {
        self.config.local_uid = uid.into();
        self
    }

    /// Connect to this peer at startup.
    pub fn peer(mut self, peer: PeerConfig) -> Self {
        self.config.peers.push(peer);
        self
    }

    /// Set the outbound queue settings.
    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.config.queue = queue;
        self
    }

    /// Set the router settings.
    pub fn router(mut self, router: RouterConfig) -> Self {
        self.config.router = router;
        self
    }

    /// Set the reconnect policy.
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Append a filter rule.
    pub fn filter(mut self, rule: FilterRule) -> Self {
        self.config.filters.push(rule);
        self
    }

    /// Source of client certificates for TLS peers.
    pub fn identity_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.identities = Some(store);
        self
    }

    /// Validate, start the retry worker and begin connecting to every
    /// configured peer.
    ///
    /// Must be called within a tokio runtime.
    pub async fn build(self) -> Result<CotClient, ConfigError> {
        let config = self.config;
        config.validate()?;

        let router = Arc::new(EventRouter::new(&config.router_config()));
        let federation = Arc::new(FederationManager::new(
            Arc::clone(&router),
            self.identities,
            config.reconnect.clone(),
            config.local_uid.clone(),
        )?);
        let queue = Arc::new(OutboundQueue::new(config.queue.clone()));
        let worker = RetryWorker::spawn(
            Arc::clone(&queue),
            Arc::clone(&federation),
            config.queue.retry_interval,
        );

        for peer in config.peers {
            federation.add_peer(peer).await?;
        }
        info!(uid = %config.local_uid, "client started");

        Ok(CotClient {
            local_uid: config.local_uid,
            router,
            federation,
            queue,
            worker: Mutex::new(Some(worker)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Category;
    use crate::core::MemoryIdentityStore;
    use crate::transport::TransportKind;

    #[tokio::test]
    async fn test_builds_from_config() {
        let config = ClientConfig::from_toml_str(
            r#"
            local_uid = "ANDROID-7"
            [[peers]]
            name = "nowhere"
            host = "127.0.0.1"
            port = 9
            keepalive_ms = 0
            [[filters]]
            action = "suppress"
            match = "category"
            category = "emergency"
            "#,
        )
        .unwrap();

        let client = CotClientBuilder::from_config(config)
            .identity_store(Arc::new(MemoryIdentityStore::new()))
            .build()
            .await
            .unwrap();
        assert_eq!(client.local_uid(), "ANDROID-7");
        assert_eq!(client.router().filters().len(), 1);
        let peers = client.federation().peers().await;
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].1.transport, TransportKind::Tcp);
        let _alerts = client.subscribe(Category::Emergency);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejects_invalid_settings() {
        let result = CotClientBuilder::new()
            .local_uid("")
            .build()
            .await;
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}

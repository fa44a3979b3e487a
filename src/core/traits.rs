//! Collaborator interfaces.
//!
//! The transport never reads certificates from disk or a keychain itself.
//! An [`IdentityStore`] hands it the material by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use super::error::IdentityError;

/// Client certificate material presented during a TLS handshake.
#[derive(Clone, PartialEq, Eq)]
pub enum ClientIdentity {
    /// PEM certificate chain (leaf first) and PEM private key.
    Pem {
        /// Leaf certificate followed by intermediates.
        certificate_chain: Vec<u8>,
        /// PKCS#8 or traditional private key.
        private_key: Vec<u8>,
    },
    /// DER-encoded PKCS#12 bundle, as issued by TAK servers.
    Pkcs12 {
        /// Bundle bytes.
        der: Vec<u8>,
        /// Bundle password.
        password: String,
    },
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        match self {
            ClientIdentity::Pem {
                certificate_chain, ..
            } => f
                .debug_struct("Pem")
                .field("certificate_chain_len", &certificate_chain.len())
                .finish_non_exhaustive(),
            ClientIdentity::Pkcs12 { der, .. } => f
                .debug_struct("Pkcs12")
                .field("der_len", &der.len())
                .finish_non_exhaustive(),
        }
    }
}

/// Secure storage collaborator.
///
/// Implementations typically wrap a platform keychain. Lookups happen on the
/// peer supervisor task before each connect attempt.
pub trait IdentityStore: Send + Sync + 'static {
    /// Load the identity registered under `name`.
    fn load_identity(&self, name: &str) -> Result<ClientIdentity, IdentityError>;

    /// PEM CA certificate to trust for peers using identity `name`.
    ///
    /// Returns `None` when no trust override is configured.
    fn trusted_ca(&self, name: &str) -> Option<Vec<u8>> {
        let _ = name;
        None
    }
}

/// In-memory identity store.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identities: RwLock<HashMap<String, ClientIdentity>>,
    trust: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryIdentityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity under `name`, replacing any previous one.
    pub fn insert(&self, name: impl Into<String>, identity: ClientIdentity) {
        if let Ok(mut map) = self.identities.write() {
            map.insert(name.into(), identity);
        }
    }

    /// Register a trusted CA for identity `name`.
    pub fn insert_trusted_ca(&self, name: impl Into<String>, ca_pem: Vec<u8>) {
        if let Ok(mut map) = self.trust.write() {
            map.insert(name.into(), ca_pem);
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load_identity(&self, name: &str) -> Result<ClientIdentity, IdentityError> {
        self.identities
            .read()
            .map_err(|_| IdentityError::Invalid("identity store poisoned".into()))?
            .get(name)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(name.to_string()))
    }

    fn trusted_ca(&self, name: &str) -> Option<Vec<u8>> {
        self.trust.read().ok()?.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_lookup() {
        let store = MemoryIdentityStore::new();
        store.insert(
            "ops",
            ClientIdentity::Pkcs12 {
                der: vec![1, 2, 3],
                password: "atakatak".into(),
            },
        );

        assert!(store.load_identity("ops").is_ok());
        assert_eq!(
            store.load_identity("missing"),
            Err(IdentityError::NotFound("missing".into()))
        );
        assert_eq!(store.trusted_ca("ops"), None);

        store.insert_trusted_ca("ops", b"-----BEGIN CERTIFICATE-----".to_vec());
        assert!(store.trusted_ca("ops").is_some());
    }

    #[test]
    fn test_identity_debug_hides_secrets() {
        let id = ClientIdentity::Pkcs12 {
            der: vec![0; 4],
            password: "secret".into(),
        };
        let printed = format!("{:?}", id);
        assert!(!printed.contains("secret"));
        assert!(printed.contains("der_len"));
    }
}

//! Transport selection and TLS policy.

use serde::{Deserialize, Serialize};

use crate::core::{DEFAULT_TCP_PORT, DEFAULT_TLS_PORT, DEFAULT_UDP_PORT};

/// Modern AEAD suites with forward secrecy (TLS 1.2 names; TLS 1.3 suites
/// use library defaults).
pub const MODERN_CIPHERS: &str = "ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:\
ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384:\
ECDHE-ECDSA-CHACHA20-POLY1305:ECDHE-RSA-CHACHA20-POLY1305";

/// Older suites appended by the legacy profile, as negotiated by TAK server
/// releases running on Java 7/8 era stacks.
pub const LEGACY_CIPHERS: &[&str] = &[
    "ECDHE-RSA-AES128-SHA256",
    "ECDHE-RSA-AES256-SHA384",
    "ECDHE-RSA-AES128-SHA",
    "ECDHE-RSA-AES256-SHA",
    "DHE-RSA-AES128-SHA",
    "DHE-RSA-AES256-SHA",
    "AES128-GCM-SHA256",
    "AES256-GCM-SHA384",
    "AES128-SHA256",
    "AES256-SHA256",
    "AES128-SHA",
    "AES256-SHA",
    "DES-CBC3-SHA",
];

/// Underlying transport of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Plain TCP stream.
    #[default]
    Tcp,
    /// UDP datagrams.
    Udp,
    /// TLS over TCP.
    Tls,
}

impl TransportKind {
    /// Conventional TAK port for this transport.
    pub fn default_port(self) -> u16 {
        match self {
            TransportKind::Tcp => DEFAULT_TCP_PORT,
            TransportKind::Udp => DEFAULT_UDP_PORT,
            TransportKind::Tls => DEFAULT_TLS_PORT,
        }
    }

    /// Whether the transport is a byte stream (needs reassembly across reads).
    pub fn is_stream(self) -> bool {
        !matches!(self, TransportKind::Udp)
    }
}

/// Protocol version bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TlsVersion {
    /// TLS 1.0
    #[serde(rename = "1.0")]
    Tls10,
    /// TLS 1.1
    #[serde(rename = "1.1")]
    Tls11,
    /// TLS 1.2
    #[serde(rename = "1.2")]
    Tls12,
    /// TLS 1.3
    #[serde(rename = "1.3")]
    Tls13,
}

/// Named policy profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsProfile {
    /// TLS 1.2 minimum, modern suites only.
    #[default]
    Strict,
    /// TLS 1.0 minimum, [`LEGACY_CIPHERS`] appended.
    Legacy,
}

/// TLS negotiation policy for one peer.
///
/// Server certificate verification is off unless
/// `accept_any_server_certificate` is cleared: TAK deployments commonly run
/// self-signed servers. With verification on, `pinned_ca_pem` is added to
/// the trust store and the host name is checked.
///
/// In configuration a policy is either a profile name (`"strict"`,
/// `"legacy"`) or a table overriding individual fields of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PolicyRepr")]
pub struct TlsPolicy {
    /// Profile the policy was derived from.
    pub profile: TlsProfile,
    /// Lowest version offered.
    pub min_version: TlsVersion,
    /// Highest version offered; library maximum when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_version: Option<TlsVersion>,
    /// Base cipher list (OpenSSL syntax).
    pub ciphers: String,
    /// Suites appended after `ciphers`.
    pub extra_ciphers: Vec<String>,
    /// Skip server certificate and host name verification.
    pub accept_any_server_certificate: bool,
    /// PEM CA certificate(s) to trust in addition to system roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned_ca_pem: Option<String>,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self::strict()
    }
}

impl TlsPolicy {
    /// Minimum TLS 1.2, modern cipher suites only.
    pub fn strict() -> Self {
        Self {
            profile: TlsProfile::Strict,
            min_version: TlsVersion::Tls12,
            max_version: None,
            ciphers: MODERN_CIPHERS.to_string(),
            extra_ciphers: Vec::new(),
            accept_any_server_certificate: true,
            pinned_ca_pem: None,
        }
    }

    /// Minimum TLS 1.0 with [`LEGACY_CIPHERS`] appended.
    pub fn legacy() -> Self {
        Self {
            profile: TlsProfile::Legacy,
            min_version: TlsVersion::Tls10,
            extra_ciphers: LEGACY_CIPHERS.iter().map(|c| c.to_string()).collect(),
            ..Self::strict()
        }
    }

    /// Policy for a named profile.
    pub fn from_profile(profile: TlsProfile) -> Self {
        match profile {
            TlsProfile::Strict => Self::strict(),
            TlsProfile::Legacy => Self::legacy(),
        }
    }

    /// Require a valid server certificate chain rooted in `ca_pem` (or the
    /// system roots when `None`).
    pub fn verify_server(mut self, ca_pem: Option<String>) -> Self {
        self.accept_any_server_certificate = false;
        self.pinned_ca_pem = ca_pem;
        self
    }

    /// Full OpenSSL cipher string.
    ///
    /// Below TLS 1.2 the security level is lowered to 0, otherwise OpenSSL 3
    /// refuses SHA-1 based handshakes outright.
    pub fn cipher_string(&self) -> String {
        let mut parts: Vec<&str> = vec![self.ciphers.as_str()];
        parts.extend(self.extra_ciphers.iter().map(String::as_str));
        if self.min_version < TlsVersion::Tls12 {
            parts.push("@SECLEVEL=0");
        }
        parts.retain(|p| !p.is_empty());
        parts.join(":")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PolicyRepr {
    Profile(TlsProfile),
    Explicit(ExplicitPolicy),
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct ExplicitPolicy {
    profile: Option<TlsProfile>,
    min_version: Option<TlsVersion>,
    max_version: Option<TlsVersion>,
    ciphers: Option<String>,
    extra_ciphers: Option<Vec<String>>,
    accept_any_server_certificate: Option<bool>,
    pinned_ca_pem: Option<String>,
}

impl From<PolicyRepr> for TlsPolicy {
    fn from(repr: PolicyRepr) -> Self {
        let explicit = match repr {
            PolicyRepr::Profile(profile) => return Self::from_profile(profile),
            PolicyRepr::Explicit(explicit) => explicit,
        };
        let mut policy = Self::from_profile(explicit.profile.unwrap_or_default());
        if let Some(v) = explicit.min_version {
            policy.min_version = v;
        }
        if explicit.max_version.is_some() {
            policy.max_version = explicit.max_version;
        }
        if let Some(c) = explicit.ciphers {
            policy.ciphers = c;
        }
        if let Some(extra) = explicit.extra_ciphers {
            policy.extra_ciphers = extra;
        }
        if let Some(any) = explicit.accept_any_server_certificate {
            policy.accept_any_server_certificate = any;
        }
        if explicit.pinned_ca_pem.is_some() {
            policy.pinned_ca_pem = explicit.pinned_ca_pem;
        }
        policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, Serialize)]
    struct Holder {
        tls: TlsPolicy,
    }

    #[test]
    fn test_profiles() {
        let strict = TlsPolicy::strict();
        assert_eq!(strict.min_version, TlsVersion::Tls12);
        assert!(strict.extra_ciphers.is_empty());
        assert!(!strict.cipher_string().contains("SECLEVEL"));

        let legacy = TlsPolicy::legacy();
        assert_eq!(legacy.min_version, TlsVersion::Tls10);
        let ciphers = legacy.cipher_string();
        assert!(ciphers.starts_with(MODERN_CIPHERS));
        assert!(ciphers.contains(":AES128-SHA:"));
        assert!(ciphers.ends_with("@SECLEVEL=0"));
    }

    #[test]
    fn test_kind_ports() {
        assert_eq!(TransportKind::Tls.default_port(), 8089);
        assert_eq!(TransportKind::Tcp.default_port(), 8087);
        assert!(!TransportKind::Udp.is_stream());
    }

    #[test]
    fn test_policy_from_profile_name() {
        let h: Holder = toml::from_str(r#"tls = "legacy""#).unwrap();
        assert_eq!(h.tls, TlsPolicy::legacy());
    }

    #[test]
    fn test_policy_overrides() {
        let h: Holder = toml::from_str(
            r#"
            [tls]
            profile = "legacy"
            min_version = "1.1"
            accept_any_server_certificate = false
            "#,
        )
        .unwrap();
        assert_eq!(h.tls.profile, TlsProfile::Legacy);
        assert_eq!(h.tls.min_version, TlsVersion::Tls11);
        assert!(!h.tls.accept_any_server_certificate);
        assert_eq!(h.tls.extra_ciphers.len(), LEGACY_CIPHERS.len());
    }

    #[test]
    fn test_policy_serializes_back() {
        let original = Holder {
            tls: TlsPolicy::legacy().verify_server(Some("PEM".into())),
        };
        let text = toml::to_string(&original).unwrap();
        let back: Holder = toml::from_str(&text).unwrap();
        assert_eq!(back.tls, original.tls);
    }
}

//! Transport layer.
//!
//! One [`TransportSession`] per peer, carrying raw bytes over TCP, UDP or
//! TLS-wrapped TCP. The session knows nothing about message boundaries; its
//! [`Inbound`] chunks are handed to a [`crate::framing::Reassembler`] by the
//! owner of the [`Ready`] channel.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │   Federation (supervisor)    │
//! ├──────────────────────────────┤
//! │   TransportSession           │  ← this module
//! │   state, counters, policy    │
//! ├──────────────┬───────────────┤
//! │  TCP / UDP   │  TLS (openssl)│
//! └──────────────┴───────────────┘
//! ```

mod policy;
mod session;
mod socket;
#[cfg(feature = "tls")]
mod tls;

pub use policy::{TlsPolicy, TlsProfile, TlsVersion, TransportKind, LEGACY_CIPHERS, MODERN_CIPHERS};
pub use session::{
    CounterSnapshot, Ready, SessionConfig, SessionCounters, SessionEvent, SessionId, SessionState,
    TransportSession,
};
pub use socket::Inbound;

//! # cot-protocol
//!
//! Client core for **Cursor-on-Target** (CoT), the XML event format used by
//! TAK situational-awareness networks.
//!
//! - **Transport**: TCP, UDP and TLS sessions, with a legacy TLS profile for
//!   servers that only speak TLS 1.0/1.1
//! - **Framing**: extraction of complete messages from a byte stream
//! - **Codec**: typed events with one payload variant per family
//! - **Routing**: per-category channels with ordered filter rules
//! - **Federation**: simultaneous connections to several servers, with
//!   reconnect backoff
//! - **Queue**: FIFO redelivery of messages that reached no peer
//!
//! ## Feature Flags
//!
//! - `tls` (default): TLS transport via OpenSSL
//!
//! ## Modules
//!
//! - [`core`]: constants, error types and collaborator traits
//! - [`transport`]: transport sessions
//! - [`framing`]: stream reassembly
//! - [`codec`]: events, `decode` and `encode`
//! - [`router`]: event routing
//! - [`federation`]: peer management
//! - [`queue`]: outbound resilience queue
//! - [`client`]: [`CotClient`], which wires the above together
//! - [`config`]: TOML configuration
//!
//! ## Example Usage
//!
//! ```rust
//! use cot_protocol::prelude::*;
//!
//! let event = Event::position(
//!     "ANDROID-1",
//!     "a-f-G-U-C",
//!     Point::new(38.8977, -77.0365).with_hae(50.0),
//!     PositionDetail::default(),
//! )
//! .build()?;
//!
//! let wire = encode(&event);
//!
//! let mut reassembler = Reassembler::new();
//! reassembler.feed(&wire[..10]);
//! assert!(reassembler.extract_next()?.is_none());
//! reassembler.feed(&wire[10..]);
//! let message = reassembler.extract_next()?.expect("one complete message");
//!
//! let decoded = decode(&message)?;
//! assert_eq!(decoded, event);
//! assert_eq!(decoded.category(), Category::Position);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;

pub mod transport;

pub mod framing;

pub mod codec;

pub mod router;

pub mod federation;

pub mod queue;

pub mod client;

pub mod config;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;

    pub use crate::codec::{
        decode, encode, Affiliation, Category, ChatDetail, Detail, EmergencyDetail,
        EmergencyKind, Event, EventBuilder, Point, PositionDetail, WaypointDetail,
    };

    pub use crate::transport::{
        SessionState, TlsPolicy, TlsProfile, TlsVersion, TransportKind, TransportSession,
    };

    pub use crate::framing::Reassembler;

    pub use crate::router::{EventRouter, FilterAction, FilterMatch, FilterRule, RoutedEvent};

    pub use crate::federation::{FederationManager, PeerConfig, PeerId, ReconnectPolicy};

    pub use crate::queue::{DeliveryReceipt, OutboundQueue, QueueConfig};

    pub use crate::client::{CotClient, CotClientBuilder, SendOutcome};

    pub use crate::config::ClientConfig;
}

// Re-export commonly used items at crate root
pub use client::{CotClient, CotClientBuilder};
pub use codec::{decode, encode, Event};
pub use crate::core::CotError;

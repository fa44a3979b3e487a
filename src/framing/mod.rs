//! Stream framing.
//!
//! TCP and TLS deliver an unstructured byte stream; UDP delivers datagrams
//! that go through the same extraction so a datagram carrying several events
//! (or trailing junk) is handled uniformly.
//!
//! ```text
//! socket reader ──chunks──▶ Reassembler ──messages──▶ codec::decode
//! ```

mod reassembler;

pub use reassembler::{Reassembler, ReassemblerLimits};

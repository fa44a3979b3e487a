//! Composition root.
//!
//! [`CotClient`] owns the router, the federation manager and the outbound
//! queue, and is passed by handle to feature code.

mod builder;
#[allow(clippy::module_inception)]
mod client;

pub use builder::CotClientBuilder;
pub use client::{ClientStats, CotClient, SendOutcome};

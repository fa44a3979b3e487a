//! Protocol and runtime constants.
//!
//! Wire-level values are fixed by the CoT event schema and by what deployed
//! TAK servers expect. Runtime defaults may be overridden through configuration.

use std::time::Duration;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// CoT schema version written on every envelope.
pub const COT_VERSION: &str = "2.0";

/// XML declaration prefixed to every encoded message.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Start marker of the envelope root element.
pub const EVENT_START_MARKER: &[u8] = b"<event";

/// End marker of the envelope root element.
pub const EVENT_END_MARKER: &[u8] = b"</event>";

/// Start marker of an XML declaration.
pub const XML_DECL_MARKER: &[u8] = b"<?xml";

/// Default `how` attribute for machine-generated events.
pub const HOW_MACHINE_GPS: &str = "m-g";

/// `how` attribute for human-entered events.
pub const HOW_HUMAN: &str = "h-g-i-g-o";

/// Sentinel for unknown circular/linear error and height.
pub const UNKNOWN_ERROR: f64 = 9_999_999.0;

/// Type tag of the TAK keepalive ping.
pub const PING_TYPE: &str = "t-x-c-t";

/// Default chat room name used by TAK clients for broadcast chat.
pub const ALL_CHAT_ROOMS: &str = "All Chat Rooms";

// =============================================================================
// PORTS
// =============================================================================

/// Default plaintext streaming port.
pub const DEFAULT_TCP_PORT: u16 = 8087;

/// Default TLS streaming port.
pub const DEFAULT_TLS_PORT: u16 = 8089;

/// Default UDP input port.
pub const DEFAULT_UDP_PORT: u16 = 8087;

// =============================================================================
// FRAMING
// =============================================================================

/// Typical encoded event size.
pub const TYPICAL_MESSAGE_SIZE: usize = 1024;

/// Buffered bytes without a complete message before a warning is logged.
pub const BUFFER_HIGH_WATER: usize = TYPICAL_MESSAGE_SIZE * 100;

/// Buffered bytes without a complete message before the buffer is cleared.
pub const BUFFER_CRITICAL: usize = TYPICAL_MESSAGE_SIZE * 1024;

/// Size of each socket read.
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Capacity of the bounded channel between a session reader and its reassembler.
pub const INBOUND_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// TIMING
// =============================================================================

/// Default stale offset applied by event builders.
pub const DEFAULT_STALE: Duration = Duration::from_secs(120);

/// Default connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on writing one message.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Default keepalive ping interval.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Initial reconnect delay.
pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Maximum reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Reconnect backoff multiplier.
pub const RECONNECT_BACKOFF: u32 = 2;

// =============================================================================
// QUEUE AND ROUTING
// =============================================================================

/// Maximum delivery attempts for a queued message.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Interval between retry passes.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Maximum number of queued outbound messages.
pub const MAX_QUEUE_ENTRIES: usize = 1000;

/// Per-category subscriber channel capacity.
pub const SUBSCRIBER_CAPACITY: usize = 256;

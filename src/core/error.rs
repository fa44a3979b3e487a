//! Error types for the CoT client core.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while opening a transport session.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Host name did not resolve.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        /// Host that was looked up.
        host: String,
        /// Underlying resolver error.
        #[source]
        source: io::Error,
    },

    /// Host resolved to no usable address.
    #[error("no address found for {0}")]
    NoAddress(String),

    /// Socket-level connect failure (refused, unreachable, ...).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Connect did not complete in time.
    #[error("connect timed out")]
    Timeout,

    /// TLS configuration or handshake failure.
    #[error("tls error: {0}")]
    Tls(String),

    /// Client identity could not be loaded or parsed.
    #[error("client identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Another connect is already running on this session.
    #[error("connect already in progress")]
    InProgress,

    /// Session already holds an active socket.
    #[error("session already connected")]
    AlreadyConnected,
}

impl ConnectError {
    /// Check whether a later attempt may succeed without configuration changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectError::Resolve { .. }
                | ConnectError::NoAddress(_)
                | ConnectError::Io(_)
                | ConnectError::Timeout
                | ConnectError::Tls(_)
        )
    }
}

/// Errors raised while writing to a session.
#[derive(Debug, Error)]
pub enum SendError {
    /// Session has no open socket.
    #[error("session not connected")]
    NotConnected,

    /// Socket write failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Write did not complete within the session's send timeout.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

impl SendError {
    /// Check whether the socket should be considered dead.
    pub fn is_fatal(&self) -> bool {
        match self {
            SendError::NotConnected => false,
            SendError::Timeout(_) => true,
            SendError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ),
        }
    }
}

/// Errors raised when a message cannot be decoded at all.
///
/// The raw bytes are kept for diagnostics.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// Not well-formed markup or not UTF-8.
    #[error("malformed envelope: {reason}")]
    Malformed {
        /// Parser message.
        reason: String,
        /// Offending message.
        raw: Vec<u8>,
    },

    /// Root element is not `event`.
    #[error("unexpected root element <{found}>")]
    UnexpectedRoot {
        /// Name of the root element found.
        found: String,
        /// Offending message.
        raw: Vec<u8>,
    },

    /// An envelope attribute is missing or unparsable.
    #[error("invalid envelope attribute {name}: {reason}")]
    InvalidAttribute {
        /// Attribute name.
        name: &'static str,
        /// What went wrong.
        reason: String,
        /// Offending message.
        raw: Vec<u8>,
    },

    /// `start` is later than `stale`.
    #[error("validity window inverted: start is after stale")]
    InvertedWindow {
        /// Offending message.
        raw: Vec<u8>,
    },
}

impl DecodeError {
    /// Raw bytes of the message that failed to decode.
    pub fn raw(&self) -> &[u8] {
        match self {
            DecodeError::Malformed { raw, .. }
            | DecodeError::UnexpectedRoot { raw, .. }
            | DecodeError::InvalidAttribute { raw, .. }
            | DecodeError::InvertedWindow { raw } => raw,
        }
    }
}

/// Errors building an [`Event`](crate::codec::Event) locally.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EventError {
    /// `start` is later than `stale`.
    #[error("validity window inverted: start is after stale")]
    InvertedWindow,

    /// Coordinates out of range or not finite.
    #[error("invalid point: lat {lat}, lon {lon}")]
    InvalidPoint {
        /// Latitude supplied.
        lat: f64,
        /// Longitude supplied.
        lon: f64,
    },

    /// The family payload needs a point and none was given.
    #[error("{0} events require a point")]
    MissingPoint(&'static str),

    /// Empty uid.
    #[error("event uid must not be empty")]
    EmptyUid,

    /// Detail payload family does not match the type tag.
    #[error("detail family {detail} does not match type tag {type_tag}")]
    FamilyMismatch {
        /// Type tag given.
        type_tag: String,
        /// Family of the payload given.
        detail: &'static str,
    },
}

/// Receive buffer grew past the critical threshold and was cleared.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("receive buffer overflow: {discarded} bytes discarded (limit {limit})")]
pub struct BufferOverflow {
    /// Bytes dropped by the reset.
    pub discarded: usize,
    /// Critical threshold in effect.
    pub limit: usize,
}

/// Errors from the outbound resilience queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Delivery attempts exhausted; terminal.
    #[error("entry {entry} exhausted {attempts} delivery attempts")]
    Exhausted {
        /// Entry that failed.
        entry: u64,
        /// Attempts made.
        attempts: u32,
    },

    /// Queue is at capacity.
    #[error("outbound queue full ({0} entries)")]
    Full(usize),

    /// Queue was shut down before the entry reached a terminal state.
    #[error("outbound queue closed")]
    Closed,
}

/// Errors raised by an identity store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// No identity with that name.
    #[error("identity not found: {0}")]
    NotFound(String),

    /// Stored material could not be parsed.
    #[error("invalid identity material: {0}")]
    Invalid(String),
}

/// Errors loading client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Document is not valid TOML for the configuration schema.
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Document parsed but holds inconsistent values.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level errors.
#[derive(Debug, Error)]
pub enum CotError {
    /// Connect error.
    #[error("connect error: {0}")]
    Connect(#[from] ConnectError),

    /// Send error.
    #[error("send error: {0}")]
    Send(#[from] SendError),

    /// Decode error.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Event construction error.
    #[error("event error: {0}")]
    Event(#[from] EventError),

    /// Buffer overflow.
    #[error(transparent)]
    Overflow(#[from] BufferOverflow),

    /// Queue error.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_retryable() {
        assert!(ConnectError::Timeout.is_retryable());
        assert!(ConnectError::Tls("handshake".into()).is_retryable());
        assert!(ConnectError::Io(io::Error::from(io::ErrorKind::ConnectionRefused)).is_retryable());

        assert!(!ConnectError::InProgress.is_retryable());
        assert!(!ConnectError::Identity(IdentityError::NotFound("x".into())).is_retryable());
    }

    #[test]
    fn test_send_error_fatal() {
        assert!(SendError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_fatal());
        assert!(!SendError::Io(io::Error::from(io::ErrorKind::WouldBlock)).is_fatal());
        assert!(!SendError::NotConnected.is_fatal());
        assert!(SendError::Timeout(Duration::from_secs(1)).is_fatal());
    }

    #[test]
    fn test_decode_error_keeps_raw() {
        let err = DecodeError::InvertedWindow {
            raw: b"<event/>".to_vec(),
        };
        assert_eq!(err.raw(), b"<event/>");
    }
}

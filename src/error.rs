//! Error types for the WebSocket handshake and framing layer.
//!
//! Handshake errors are answered with an HTTP `400` and never outlive the
//! connection; frame errors are fatal to the connection that produced them.

use thiserror::Error;

use crate::message::CloseCode;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Upgrade request is not a valid WebSocket upgrade.
    #[error("Malformed handshake: {0}")]
    MalformedHandshake(String),

    /// Upgrade request carries no `Sec-WebSocket-Key`.
    #[error("Missing Sec-WebSocket-Key header")]
    MissingKey,

    /// Protocol violation detected in the frame stream.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Frame or message payload exceeds the configured maximum.
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge {
        /// Announced or accumulated size.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// Invalid UTF-8 in a text message or close reason.
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,

    /// Close code that must not be sent on the wire.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Response header value would break the HTTP framing.
    #[error("Invalid value for header {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why the value was refused.
        reason: String,
    },

    /// Not enough buffered data to finish parsing a frame.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Connection has been closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// I/O error occurred on the transport.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Returns `true` for errors answered with an HTTP `400` during the upgrade.
    #[must_use]
    pub const fn is_handshake(&self) -> bool {
        matches!(self, Error::MalformedHandshake(_) | Error::MissingKey)
    }

    /// Close code to send before tearing the connection down, if any.
    ///
    /// Transport and handshake failures have no close code: there is either
    /// no WebSocket session yet or no way left to reach the peer.
    #[must_use]
    pub const fn close_code(&self) -> Option<CloseCode> {
        match self {
            Error::ProtocolViolation(_) => Some(CloseCode::ProtocolError),
            Error::PayloadTooLarge { .. } => Some(CloseCode::MessageTooBig),
            Error::InvalidUtf8 => Some(CloseCode::InvalidPayload),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

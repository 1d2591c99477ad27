//! Configuration and limits for server-side WebSocket connections.

use std::time::Duration;

use crate::error::{Error, Result};

/// Resource limits for inbound traffic.
///
/// These limits prevent resource exhaustion attacks and ensure
/// bounded memory usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum payload size of a single inbound frame in bytes.
    ///
    /// Checked as soon as the length field is decoded, before the payload
    /// is buffered.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_payload_size: usize,

    /// Maximum size of a reassembled message in bytes.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum number of frames in a single fragmented message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,

    /// Maximum size of the HTTP upgrade request head in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_payload_size: 16 * 1024 * 1024, // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_fragment_count: 128,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_payload_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_payload_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Create limits suitable for small embedded systems.
    ///
    /// - Max payload: 64 KB
    /// - Max message: 256 KB
    /// - Max fragments: 16
    /// - Max handshake: 4 KB
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_payload_size: 64 * 1024,
            max_message_size: 256 * 1024,
            max_fragment_count: 16,
            max_handshake_size: 4096,
        }
    }

    /// Create limits for trusted peers.
    ///
    /// Payload and message sizes are bounded only by the platform.
    #[must_use]
    pub const fn unrestricted() -> Self {
        Self {
            max_payload_size: usize::MAX,
            max_message_size: usize::MAX,
            max_fragment_count: 1024,
            max_handshake_size: 64 * 1024,
        }
    }

    /// Validate the accumulated size of a message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] if `size` exceeds `max_message_size`.
    pub const fn check_message_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            Err(Error::PayloadTooLarge {
                size: size as u64,
                max: self.max_message_size as u64,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that fragment count is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolViolation`] if `count` exceeds `max_fragment_count`.
    pub fn check_fragment_count(&self, count: usize) -> Result<()> {
        if count > self.max_fragment_count {
            Err(Error::ProtocolViolation(format!(
                "Too many fragments: {} (max: {})",
                count, self.max_fragment_count
            )))
        } else {
            Ok(())
        }
    }
}

/// Timeout configuration for the async host.
///
/// The sans-I/O [`Connection`](crate::Connection) never reads these; only
/// [`server`](crate::server) enforces them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Maximum time to receive the complete upgrade request.
    /// Default: 30 seconds
    pub handshake: Duration,

    /// Maximum time to wait for incoming data.
    /// Default: 60 seconds
    pub read: Duration,

    /// Maximum time to wait for outgoing data to be written.
    /// Default: 60 seconds
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(30),
            read: Duration::from_secs(60),
            write: Duration::from_secs(60),
        }
    }
}

impl Timeouts {
    /// Create new timeouts with custom values.
    #[must_use]
    pub const fn new(handshake: Duration, read: Duration, write: Duration) -> Self {
        Self {
            handshake,
            read,
            write,
        }
    }
}

/// Server-side connection configuration.
///
/// Read-only after startup; each connection keeps its own clone.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Maximum payload per outbound frame.
    ///
    /// Data messages larger than this are split into a data frame followed
    /// by continuation frames. `None` sends every message as one frame.
    ///
    /// Default: None
    pub fragment_size: Option<usize>,

    /// How long to wait for the peer's close echo after initiating a close.
    ///
    /// Default: 5 seconds
    pub close_timeout: Duration,

    /// Initial capacity of the inbound accumulation buffer.
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,

    /// Host-side I/O timeouts.
    ///
    /// If `None`, the host waits indefinitely (except for the close handshake).
    /// Default: None
    pub timeouts: Option<Timeouts>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            fragment_size: None,
            close_timeout: Duration::from_secs(5),
            read_buffer_size: 8192,
            timeouts: None,
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the maximum inbound frame payload size.
    #[must_use]
    pub const fn with_max_payload_size(mut self, size: usize) -> Self {
        self.limits.max_payload_size = size;
        self
    }

    /// Split outbound data messages into frames of at most `size` bytes.
    #[must_use]
    pub const fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = Some(size);
        self
    }

    /// Set the close handshake timeout.
    #[must_use]
    pub const fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set timeout configuration.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }
}

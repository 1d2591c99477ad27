//! Messages delivered to and accepted from the host, plus close status codes.

use crate::error::{Error, Result};
use crate::protocol::OpCode;

/// Status code carried by a Close frame (RFC 6455 Section 7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// 1000
    #[default]
    Normal,
    /// 1001, e.g. server shutdown.
    GoingAway,
    /// 1002
    ProtocolError,
    /// 1003, a data type the endpoint cannot accept.
    UnsupportedData,
    /// 1007, e.g. non-UTF-8 text.
    InvalidPayload,
    /// 1008
    PolicyViolation,
    /// 1009, a frame or message over the configured limits.
    MessageTooBig,
    /// 1010
    MandatoryExtension,
    /// 1011
    InternalError,
    /// Any other numeric code, registered or application-defined.
    Other(u16),
}

impl CloseCode {
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1002 => Self::ProtocolError,
            1003 => Self::UnsupportedData,
            1007 => Self::InvalidPayload,
            1008 => Self::PolicyViolation,
            1009 => Self::MessageTooBig,
            1010 => Self::MandatoryExtension,
            1011 => Self::InternalError,
            n => Self::Other(n),
        }
    }

    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match *self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::ProtocolError => 1002,
            Self::UnsupportedData => 1003,
            Self::InvalidPayload => 1007,
            Self::PolicyViolation => 1008,
            Self::MessageTooBig => 1009,
            Self::MandatoryExtension => 1010,
            Self::InternalError => 1011,
            Self::Other(n) => n,
        }
    }

    /// Whether the code may appear in a Close frame on the wire:
    /// 1000-1003, 1007-1014 and the 3000-4999 application range.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self.as_u16(), 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self::from_u16(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

/// Reason bytes that fit in a control frame after the 2-byte code.
const MAX_CLOSE_REASON: usize = 123;

/// Parsed body of a Close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: CloseCode,
    pub reason: String,
}

impl CloseFrame {
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Parse the payload of a received Close frame.
    ///
    /// An empty payload carries no status and yields `None`.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a 1-byte payload or a code that may
    ///   not appear on the wire
    /// - `Error::InvalidUtf8` if the reason is not valid UTF-8
    pub fn parse(payload: &[u8]) -> Result<Option<Self>> {
        let (code, reason) = match payload {
            [] => return Ok(None),
            [_] => {
                return Err(Error::ProtocolViolation(
                    "Close payload must be empty or at least 2 bytes".into(),
                ));
            }
            [hi, lo, reason @ ..] => (CloseCode::from_u16(u16::from_be_bytes([*hi, *lo])), reason),
        };

        if !code.is_valid() {
            return Err(Error::ProtocolViolation(format!(
                "Invalid close code on the wire: {}",
                code.as_u16()
            )));
        }
        let reason = std::str::from_utf8(reason)?;
        Ok(Some(Self::new(code, reason)))
    }

    /// Encode as a Close frame payload: big-endian code then the reason.
    ///
    /// Reasons longer than 123 bytes are cut at the last char boundary that fits.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut end = self.reason.len().min(MAX_CLOSE_REASON);
        while !self.reason.is_char_boundary(end) {
            end -= 1;
        }
        let mut payload = Vec::with_capacity(2 + end);
        payload.extend_from_slice(&self.code.as_u16().to_be_bytes());
        payload.extend_from_slice(&self.reason.as_bytes()[..end]);
        payload
    }
}

/// A complete message.
///
/// Data messages are fully reassembled before they reach the host. Control
/// messages are surfaced as they arrive; the connection has already queued
/// any Pong or Close echo they require.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// `None` when the peer's Close carried no status code.
    Close(Option<CloseFrame>),
}

impl Message {
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::Binary(data.into())
    }

    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::Ping(data.into())
    }

    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::Pong(data.into())
    }

    #[must_use]
    pub fn close(code: CloseCode, reason: impl Into<String>) -> Self {
        Self::Close(Some(CloseFrame::new(code, reason)))
    }

    /// Text or Binary.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        self.opcode().is_data()
    }

    #[must_use]
    pub const fn is_control(&self) -> bool {
        self.opcode().is_control()
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The payload bytes of any message except Close.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(s) => Some(s.as_bytes()),
            Self::Binary(data) | Self::Ping(data) | Self::Pong(data) => Some(data),
            Self::Close(_) => None,
        }
    }

    /// The opcode this message is sent with.
    #[must_use]
    pub const fn opcode(&self) -> OpCode {
        match self {
            Self::Text(_) => OpCode::Text,
            Self::Binary(_) => OpCode::Binary,
            Self::Ping(_) => OpCode::Ping,
            Self::Pong(_) => OpCode::Pong,
            Self::Close(_) => OpCode::Close,
        }
    }

    /// Split into the opcode and wire payload.
    #[must_use]
    pub fn into_parts(self) -> (OpCode, Vec<u8>) {
        let opcode = self.opcode();
        let payload = match self {
            Self::Text(s) => s.into_bytes(),
            Self::Binary(data) | Self::Ping(data) | Self::Pong(data) => data,
            Self::Close(Some(frame)) => frame.encode(),
            Self::Close(None) => Vec::new(),
        };
        (opcode, payload)
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}

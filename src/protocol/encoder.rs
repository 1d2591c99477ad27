//! Outbound (server-to-client) frame encoding and fragmentation.

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::frame::{Frame, MAX_CONTROL_FRAME_PAYLOAD};
use crate::protocol::OpCode;

/// Iterator that produces frames from a message payload.
///
/// Splits large payloads into multiple frames according to the configured
/// fragment size. First frame uses the original opcode, continuation frames
/// use `OpCode::Continuation`.
pub struct Fragments<'a> {
    payload: &'a [u8],
    opcode: OpCode,
    fragment_size: usize,
    offset: usize,
    is_first: bool,
}

impl<'a> Fragments<'a> {
    /// Create a new fragmenter for the given payload.
    #[inline]
    #[must_use]
    pub fn new(payload: &'a [u8], opcode: OpCode, fragment_size: usize) -> Self {
        Self {
            payload,
            opcode,
            fragment_size: fragment_size.max(1),
            offset: 0,
            is_first: true,
        }
    }

    /// Bytes not yet handed out.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.payload.len().saturating_sub(self.offset)
    }
}

impl Iterator for Fragments<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.payload.len() {
            // An empty message is still one frame
            if self.is_first {
                self.is_first = false;
                return Some(Frame::new(true, self.opcode, Bytes::new()));
            }
            return None;
        }

        let chunk_size = self.remaining().min(self.fragment_size);
        let end = self.offset + chunk_size;
        let chunk = Bytes::copy_from_slice(&self.payload[self.offset..end]);
        self.offset = end;

        let opcode = if self.is_first {
            self.is_first = false;
            self.opcode
        } else {
            OpCode::Continuation
        };

        Some(Frame::new(end == self.payload.len(), opcode, chunk))
    }
}

/// Encodes messages as unmasked server frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder {
    fragment_size: Option<usize>,
}

impl Encoder {
    /// Create an encoder; data payloads longer than `fragment_size` are split.
    #[must_use]
    pub const fn new(fragment_size: Option<usize>) -> Self {
        Self { fragment_size }
    }

    /// Append the wire bytes for one outbound message to `dst`.
    ///
    /// Data opcodes are fragmented per the configured frame size. Control
    /// opcodes always produce a single frame.
    ///
    /// # Errors
    ///
    /// `Error::ProtocolViolation` for a control payload over 125 bytes or a
    /// bare `Continuation` opcode. Nothing is written on error.
    pub fn encode(&self, opcode: OpCode, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        match opcode {
            OpCode::Continuation => Err(Error::ProtocolViolation(
                "Continuation frames are only produced by fragmentation".into(),
            )),
            op if op.is_control() => {
                if payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                    return Err(Error::ProtocolViolation(format!(
                        "{} payload too large: {} bytes (max: {})",
                        op,
                        payload.len(),
                        MAX_CONTROL_FRAME_PAYLOAD
                    )));
                }
                Frame::new(true, op, Bytes::copy_from_slice(payload)).write(dst, None);
                Ok(())
            }
            op => {
                let fragment_size = self.fragment_size.unwrap_or(usize::MAX);
                for frame in Fragments::new(payload, op, fragment_size) {
                    frame.write(dst, None);
                }
                Ok(())
            }
        }
    }

    /// Encode a [`Message`].
    ///
    /// # Errors
    ///
    /// `Error::InvalidCloseCode` for a close code that must not be sent,
    /// otherwise as [`Encoder::encode`].
    pub fn encode_message(&self, message: Message, dst: &mut BytesMut) -> Result<()> {
        if let Message::Close(Some(close)) = &message {
            if !close.code.is_valid() {
                return Err(Error::InvalidCloseCode(close.code.as_u16()));
            }
        }
        let (opcode, payload) = message.into_parts();
        self.encode(opcode, &payload, dst)
    }
}

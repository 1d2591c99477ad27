//! Reassembly of fragmented data messages (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{Frame, OpCode};

/// Accumulates a data frame and its continuations into one [`Message`].
///
/// Control frames never enter the accumulator; the connection dispatches
/// them before calling [`push`](Self::push), so they can interleave with an
/// open fragmented message.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    limits: Limits,
}

impl MessageAssembler {
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            limits,
        }
    }

    /// Add a data frame to the message being assembled.
    ///
    /// Returns `Some(message)` when the frame carries FIN, `None` otherwise.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a continuation with nothing open, a
    ///   new data frame while a message is open, a control frame, or too many
    ///   fragments
    /// - `Error::PayloadTooLarge` when the accumulated size exceeds the limit
    /// - `Error::InvalidUtf8` if a completed text message is not UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        match frame.opcode {
            OpCode::Continuation => {
                if self.opcode.is_none() {
                    return Err(Error::ProtocolViolation(
                        "Unexpected continuation frame".into(),
                    ));
                }
            }
            OpCode::Text | OpCode::Binary => {
                if self.opcode.is_some() {
                    return Err(Error::ProtocolViolation(
                        "Expected continuation frame".into(),
                    ));
                }
                self.opcode = Some(frame.opcode);
            }
            op => {
                return Err(Error::ProtocolViolation(format!(
                    "{} frame cannot be part of a data message",
                    op
                )));
            }
        }

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin {
            return Ok(None);
        }

        let payload = self.buffer.split().to_vec();
        let opcode = self.opcode.take();
        self.fragment_count = 0;

        match opcode {
            Some(OpCode::Text) => String::from_utf8(payload)
                .map(|text| Some(Message::Text(text)))
                .map_err(|_| Error::InvalidUtf8),
            _ => Ok(Some(Message::Binary(payload))),
        }
    }

    /// Returns `true` while a fragmented message is open.
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Bytes accumulated so far for the open message.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partially assembled message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fragment_count = 0;
        self.opcode = None;
    }
}

//! Server-side frame decoder over an accumulating byte buffer.

use bytes::{Buf, BytesMut};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::frame::{Frame, FrameHeader};
use crate::protocol::mask::apply_mask_fast;

/// Upper bound on buffer growth requested ahead of payload bytes arriving.
const MAX_RESERVE: usize = 64 * 1024;

/// Decodes client-to-server frames from a [`BytesMut`] that the host keeps
/// appending to.
///
/// Bytes may be split at any position across deliveries. `decode` returns
/// `Ok(None)` until a whole frame is buffered and leaves the partial bytes
/// in place. Once an error has been returned the decoder is poisoned and
/// every later call fails with `Error::ConnectionClosed`.
#[derive(Debug, Clone)]
pub struct Decoder {
    max_payload_size: u64,
    failed: bool,
}

impl Decoder {
    /// Create a decoder enforcing `limits.max_payload_size` per frame.
    #[must_use]
    pub fn new(limits: &Limits) -> Self {
        Self::with_max_payload_size(limits.max_payload_size)
    }

    /// Create a decoder with an explicit per-frame payload cap.
    #[must_use]
    pub fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self {
            max_payload_size: max_payload_size as u64,
            failed: false,
        }
    }

    /// Returns `true` once the decoder has produced a fatal error.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.failed
    }

    /// Decode the next frame from the front of `src`.
    ///
    /// On success the frame's bytes are removed from `src` and the payload
    /// is returned unmasked.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for unknown opcodes, set RSV bits, unmasked
    ///   frames, fragmented or oversized control frames
    /// - `Error::PayloadTooLarge` as soon as an announced length exceeds the cap
    /// - `Error::ConnectionClosed` if called after a previous error
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if self.failed {
            return Err(Error::ConnectionClosed);
        }
        let result = self.decode_frame(src);
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn decode_frame(&self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let header = match FrameHeader::parse(src, self.max_payload_size) {
            Ok(header) => header,
            Err(Error::IncompleteFrame { needed }) => {
                src.reserve(needed);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        header.validate()?;

        let Some(mask) = header.mask else {
            return Err(Error::ProtocolViolation(
                "Client frames must be masked".into(),
            ));
        };

        let frame_len = header.frame_len();
        if src.len() < frame_len {
            // The announced length is peer-controlled
            src.reserve((frame_len - src.len()).min(MAX_RESERVE));
            return Ok(None);
        }

        src.advance(header.header_len);
        let mut payload = src.split_to(header.payload_len);
        apply_mask_fast(&mut payload, mask);

        Ok(Some(Frame::from_parts(&header, payload.freeze())))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(&Limits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;

    const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    fn client_frame(frame: &Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        frame.write(&mut buf, Some(MASK));
        buf
    }

    #[test]
    fn test_decode_masked_text() {
        let mut decoder = Decoder::default();
        let mut buf = BytesMut::from(
            &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58][..],
        );

        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.mask, Some(MASK));
        assert_eq!(frame.payload(), b"Hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_needs_more_bytes() {
        let mut decoder = Decoder::default();
        let full = client_frame(&Frame::binary(vec![7u8; 300]));

        let mut buf = BytesMut::from(&full[..1]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 1);

        buf.extend_from_slice(&full[1..100]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 100);

        buf.extend_from_slice(&full[100..]);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.payload(), &[7u8; 300][..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_byte_at_a_time() {
        let mut decoder = Decoder::default();
        let full = client_frame(&Frame::text(b"split everywhere".to_vec()));
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();

        for byte in full.iter() {
            buf.extend_from_slice(&[*byte]);
            if let Some(frame) = decoder.decode(&mut buf).unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"split everywhere");
    }

    #[test]
    fn test_decode_multiple_frames_in_one_buffer() {
        let mut decoder = Decoder::default();
        let mut buf = client_frame(&Frame::text(b"one".to_vec()));
        buf.extend_from_slice(&client_frame(&Frame::ping(b"two".to_vec())));
        buf.extend_from_slice(&[0x81]);

        let first = decoder.decode(&mut buf).unwrap().unwrap();
        let second = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.payload(), b"one");
        assert_eq!(second.opcode, OpCode::Ping);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], &[0x81]);
    }

    #[test]
    fn test_decode_rejects_unmasked() {
        let mut decoder = Decoder::default();
        let mut buf = BytesMut::from(&[0x81, 0x02, b'h', b'i'][..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_decode_rejects_rsv_bits() {
        let mut decoder = Decoder::default();
        let mut frame = Frame::text(b"x".to_vec());
        frame.rsv2 = true;
        let mut buf = client_frame(&frame);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_decode_rejects_bad_control_frames() {
        let mut fragmented = Frame::ping(b"p".to_vec());
        fragmented.fin = false;
        let mut buf = client_frame(&fragmented);
        assert!(matches!(
            Decoder::default().decode(&mut buf),
            Err(Error::ProtocolViolation(_))
        ));

        let mut buf = client_frame(&Frame::pong(vec![0u8; 126]));
        assert!(matches!(
            Decoder::default().decode(&mut buf),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_decode_rejects_reserved_opcode() {
        let mut decoder = Decoder::default();
        let mut buf = BytesMut::from(&[0x85, 0x80, 0, 0, 0, 0][..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_before_payload() {
        let mut decoder = Decoder::with_max_payload_size(1024);
        // 16-bit length of 2048, nothing else buffered
        let mut buf = BytesMut::from(&[0x82, 0xfe, 0x08, 0x00][..]);

        assert!(matches!(
            decoder.decode(&mut buf),
            Err(Error::PayloadTooLarge {
                size: 2048,
                max: 1024
            })
        ));
    }

    #[test]
    fn test_decode_huge_announced_length_reserves_bounded() {
        let mut decoder = Decoder::new(&Limits::unrestricted());
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x82, 0xff]);
        buf.extend_from_slice(&(1u64 << 62).to_be_bytes());
        buf.extend_from_slice(&MASK);

        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 14);
        assert!(buf.capacity() < 1 << 20);

        buf.extend_from_slice(&[0u8; 1000]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(!decoder.is_failed());
    }

    #[test]
    fn test_decode_poisoned_after_error() {
        let mut decoder = Decoder::default();
        let mut buf = BytesMut::from(&[0x81, 0x00][..]);
        assert!(decoder.decode(&mut buf).is_err());
        assert!(decoder.is_failed());

        let mut good = client_frame(&Frame::text(b"late".to_vec()));
        assert!(matches!(
            decoder.decode(&mut good),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_decode_empty_payload() {
        let mut decoder = Decoder::default();
        let mut buf = client_frame(&Frame::binary(Vec::new()));
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert!(frame.payload().is_empty());
    }
}

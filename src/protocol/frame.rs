//! WebSocket frame parsing and serialization (RFC 6455 Section 5.2).

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame};
use crate::protocol::OpCode;
use crate::protocol::mask::{apply_mask, apply_mask_fast};

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Decoded frame header.
///
/// Produced by [`FrameHeader::parse`] once every header field, including the
/// mask key, is buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key, present iff the MASK bit is set.
    pub mask: Option<[u8; 4]>,
    /// Payload length announced by the length fields.
    pub payload_len: usize,
    /// Bytes occupied by the header, mask key included.
    pub header_len: usize,
}

impl FrameHeader {
    /// Parse a frame header from the front of `buf`.
    ///
    /// The announced payload length is checked against `max_payload` as soon
    /// as the length field is complete, before the mask key or payload are
    /// required to be present.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if the header is not fully buffered yet
    /// - `Error::ProtocolViolation` for unknown opcodes or a 64-bit length with its top bit set
    /// - `Error::PayloadTooLarge` if the length exceeds `max_payload` or `usize`
    pub fn parse(buf: &[u8], max_payload: u64) -> Result<Self> {
        if buf.len() < 2 {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        }

        let byte0 = buf[0];
        let byte1 = buf[1];

        let fin = (byte0 & 0x80) != 0;
        let rsv1 = (byte0 & 0x40) != 0;
        let rsv2 = (byte0 & 0x20) != 0;
        let rsv3 = (byte0 & 0x10) != 0;
        let opcode = OpCode::from_u8(byte0 & 0x0F)?;

        let masked = (byte1 & 0x80) != 0;
        let base_len = byte1 & 0x7F;

        let (payload_len, len_end) = match base_len {
            0..=125 => (u64::from(base_len), 2),
            126 => {
                if buf.len() < 4 {
                    return Err(Error::IncompleteFrame {
                        needed: 4 - buf.len(),
                    });
                }
                (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4)
            }
            _ => {
                if buf.len() < 10 {
                    return Err(Error::IncompleteFrame {
                        needed: 10 - buf.len(),
                    });
                }
                let mut len_bytes = [0u8; 8];
                len_bytes.copy_from_slice(&buf[2..10]);
                let len = u64::from_be_bytes(len_bytes);
                if len & (1 << 63) != 0 {
                    return Err(Error::ProtocolViolation(
                        "Most significant bit of 64-bit length must be 0".into(),
                    ));
                }
                (len, 10)
            }
        };

        if payload_len > max_payload {
            return Err(Error::PayloadTooLarge {
                size: payload_len,
                max: max_payload,
            });
        }
        let payload_len = usize::try_from(payload_len).map_err(|_| Error::PayloadTooLarge {
            size: payload_len,
            max: usize::MAX as u64,
        })?;

        let header_len = if masked { len_end + 4 } else { len_end };
        if buf.len() < header_len {
            return Err(Error::IncompleteFrame {
                needed: header_len - buf.len(),
            });
        }

        let mask = masked.then(|| [buf[len_end], buf[len_end + 1], buf[len_end + 2], buf[len_end + 3]]);

        Ok(Self {
            fin,
            rsv1,
            rsv2,
            rsv3,
            opcode,
            mask,
            payload_len,
            header_len,
        })
    }

    /// Check the header-only rules every inbound frame must satisfy.
    ///
    /// # Errors
    ///
    /// Returns `Error::ProtocolViolation` if RSV bits are set (no extensions
    /// are ever negotiated) or if a control frame is fragmented or carries
    /// more than 125 bytes.
    pub fn validate(&self) -> Result<()> {
        if self.rsv1 || self.rsv2 || self.rsv3 {
            return Err(Error::ProtocolViolation(
                "Reserved bits set without negotiated extension".into(),
            ));
        }
        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::ProtocolViolation(format!(
                    "{} frame must not be fragmented",
                    self.opcode
                )));
            }
            if self.payload_len > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ProtocolViolation(format!(
                    "{} frame payload too large: {} bytes (max: {})",
                    self.opcode, self.payload_len, MAX_CONTROL_FRAME_PAYLOAD
                )));
            }
        }
        Ok(())
    }

    /// Total wire size of the frame this header describes.
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        self.header_len.saturating_add(self.payload_len)
    }
}

/// A WebSocket frame as defined in RFC 6455.
///
/// The payload is always stored unmasked; `mask` records whether the frame
/// arrived masked and with which key.
///
/// ## Frame Structure
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                         Masking key (if present)              |
/// +---------------------------------------------------------------+
/// |                     Payload data                              |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag. True if this is the last fragment of a message.
    pub fin: bool,
    /// Reserved bit 1. Must be 0 unless extension is negotiated.
    pub rsv1: bool,
    /// Reserved bit 2. Must be 0 unless extension is negotiated.
    pub rsv2: bool,
    /// Reserved bit 3. Must be 0 unless extension is negotiated.
    pub rsv3: bool,
    /// Frame opcode defining the interpretation of payload data.
    pub opcode: OpCode,
    /// Masking key the frame arrived with, if any.
    pub mask: Option<[u8; 4]>,
    payload: Bytes,
}

impl Frame {
    /// Create a new unmasked frame.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    /// Create a text frame.
    #[must_use]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, data)
    }

    /// Create a binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, data)
    }

    /// Create a close frame with optional status code and reason.
    #[must_use]
    pub fn close(code: Option<CloseCode>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => CloseFrame::new(code, reason).encode(),
            None => Vec::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, data)
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, data)
    }

    /// Returns `true` if the frame arrived with the MASK bit set.
    #[inline]
    #[must_use]
    pub const fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Get the (unmasked) payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    pub(crate) fn from_parts(header: &FrameHeader, payload: Bytes) -> Self {
        Self {
            fin: header.fin,
            rsv1: header.rsv1,
            rsv2: header.rsv2,
            rsv3: header.rsv3,
            opcode: header.opcode,
            mask: header.mask,
            payload,
        }
    }

    /// Parse one frame from the front of `buf`, masked or not.
    ///
    /// Returns the frame with its payload unmasked and the number of bytes
    /// consumed. No role or size rules are applied; the server-side
    /// [`Decoder`](crate::protocol::Decoder) layers those on top.
    ///
    /// ## Errors
    ///
    /// - `Error::IncompleteFrame` if not enough data is available
    /// - `Error::ProtocolViolation` if the opcode is unknown
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let header = FrameHeader::parse(buf, u64::MAX)?;
        let total = header.frame_len();

        if buf.len() < total {
            return Err(Error::IncompleteFrame {
                needed: total - buf.len(),
            });
        }

        let mut payload = buf[header.header_len..total].to_vec();
        if let Some(mask) = header.mask {
            apply_mask_fast(&mut payload, mask);
        }

        Ok((Self::from_parts(&header, Bytes::from(payload)), total))
    }

    /// Validate the frame according to RFC 6455.
    ///
    /// # Errors
    ///
    /// Returns `Error::ProtocolViolation` if RSV bits are set or a control
    /// frame is fragmented or larger than 125 bytes.
    pub fn validate(&self) -> Result<()> {
        FrameHeader {
            fin: self.fin,
            rsv1: self.rsv1,
            rsv2: self.rsv2,
            rsv3: self.rsv3,
            opcode: self.opcode,
            mask: self.mask,
            payload_len: self.payload.len(),
            header_len: 0,
        }
        .validate()
    }

    /// Append the wire form of this frame to `dst`.
    ///
    /// Server frames pass `None`. A mask key is only ever supplied when
    /// producing client-side traffic, e.g. in tests.
    pub fn write(&self, dst: &mut BytesMut, mask: Option<[u8; 4]>) {
        let payload_len = self.payload.len();
        dst.reserve(self.wire_size(mask.is_some()));

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        if self.rsv1 {
            byte0 |= 0x40;
        }
        if self.rsv2 {
            byte0 |= 0x20;
        }
        if self.rsv3 {
            byte0 |= 0x10;
        }
        dst.put_u8(byte0);

        let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
        if payload_len <= 125 {
            dst.put_u8(mask_bit | payload_len as u8);
        } else if payload_len <= usize::from(u16::MAX) {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(payload_len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(payload_len as u64);
        }

        match mask {
            Some(mask_key) => {
                dst.put_slice(&mask_key);
                let start = dst.len();
                dst.put_slice(&self.payload);
                apply_mask(&mut dst[start..], mask_key);
            }
            None => dst.put_slice(&self.payload),
        }
    }

    /// Calculate the size needed to write this frame.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let payload_len = self.payload.len();
        let extended_len_size = if payload_len <= 125 {
            0
        } else if payload_len <= 65535 {
            2
        } else {
            8
        };
        let mask_size = if masked { 4 } else { 0 };
        2 + extended_len_size + mask_size + payload_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_wire(frame: &Frame, mask: Option<[u8; 4]>) -> BytesMut {
        let mut buf = BytesMut::new();
        frame.write(&mut buf, mask);
        buf
    }

    #[test]
    fn test_parse_unmasked_text_frame() {
        // FIN=1, opcode=1 (text), unmasked, payload="Hello"
        let data = &[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
        let (frame, len) = Frame::parse(data).unwrap();
        assert_eq!(len, 7);
        assert!(frame.fin);
        assert!(!frame.is_masked());
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_parse_masked_text_frame() {
        // RFC 6455 Section 5.7 single-frame masked text message
        let data = &[
            0x81, 0x85, // FIN + Text, MASK + len=5
            0x37, 0xfa, 0x21, 0x3d, // Mask key
            0x7f, 0x9f, 0x4d, 0x51, 0x58, // Masked "Hello"
        ];
        let (frame, len) = Frame::parse(data).unwrap();
        assert_eq!(len, 11);
        assert!(frame.fin);
        assert_eq!(frame.mask, Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_parse_fragmented_frame() {
        // FIN=0, opcode=1 (text), unmasked, payload="Hel"
        let data = &[0x01, 0x03, 0x48, 0x65, 0x6c];
        let (frame, len) = Frame::parse(data).unwrap();
        assert_eq!(len, 5);
        assert!(!frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hel");
    }

    #[test]
    fn test_parse_control_frames() {
        let (close, _) = Frame::parse(&[0x88, 0x02, 0x03, 0xe8]).unwrap();
        assert_eq!(close.opcode, OpCode::Close);
        assert_eq!(close.payload(), &[0x03, 0xe8]);

        let (ping, _) = Frame::parse(&[0x89, 0x04, b'p', b'i', b'n', b'g']).unwrap();
        assert_eq!(ping.opcode, OpCode::Ping);
        assert_eq!(ping.payload(), b"ping");

        let (pong, _) = Frame::parse(&[0x8a, 0x00]).unwrap();
        assert_eq!(pong.opcode, OpCode::Pong);
        assert!(pong.payload().is_empty());
    }

    #[test]
    fn test_parse_extended_length_126() {
        let mut data = vec![0x82, 0x7e, 0x01, 0x00]; // len=256
        data.extend(vec![0xab; 256]);

        let (frame, len) = Frame::parse(&data).unwrap();
        assert_eq!(len, 4 + 256);
        assert_eq!(frame.payload().len(), 256);
        assert!(frame.payload().iter().all(|&b| b == 0xab));
    }

    #[test]
    fn test_parse_extended_length_127() {
        let mut data = vec![0x82, 0x7f];
        data.extend(65536u64.to_be_bytes());
        data.extend(vec![0xcd; 65536]);

        let (frame, len) = Frame::parse(&data).unwrap();
        assert_eq!(len, 10 + 65536);
        assert_eq!(frame.payload().len(), 65536);
    }

    #[test]
    fn test_parse_reserved_opcode() {
        let result = Frame::parse(&[0x83, 0x00]);
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));

        let result = Frame::parse(&[0x8b, 0x00]);
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_parse_incomplete_header() {
        let result = Frame::parse(&[0x81]);
        assert!(matches!(result, Err(Error::IncompleteFrame { needed: 1 })));
    }

    #[test]
    fn test_parse_incomplete_payload() {
        // FIN=1, opcode=1, len=5 but only 3 bytes of payload
        let result = Frame::parse(&[0x81, 0x05, 0x48, 0x65, 0x6c]);
        assert!(matches!(result, Err(Error::IncompleteFrame { needed: 2 })));
    }

    #[test]
    fn test_parse_incomplete_extended_lengths() {
        let result = Frame::parse(&[0x82, 0x7e, 0x01]);
        assert!(matches!(result, Err(Error::IncompleteFrame { needed: 1 })));

        let result = Frame::parse(&[0x82, 0x7f, 0x00, 0x00, 0x00]);
        assert!(matches!(result, Err(Error::IncompleteFrame { needed: 5 })));
    }

    #[test]
    fn test_parse_incomplete_mask_key() {
        let result = Frame::parse(&[0x81, 0x85, 0x37, 0xfa]);
        assert!(matches!(result, Err(Error::IncompleteFrame { needed: 2 })));
    }

    #[test]
    fn test_header_rejects_oversized_length_before_mask() {
        // 64-bit length of 1 MiB, mask key not yet buffered
        let mut data = vec![0x82, 0xff];
        data.extend_from_slice(&(1u64 << 20).to_be_bytes());

        let result = FrameHeader::parse(&data, 1024);
        assert!(matches!(
            result,
            Err(Error::PayloadTooLarge { size, max: 1024 }) if size == 1 << 20
        ));
    }

    #[test]
    fn test_header_rejects_64bit_length_msb() {
        let mut data = vec![0x82, 0xff];
        data.extend_from_slice(&u64::MAX.to_be_bytes());
        data.extend_from_slice(&[0, 0, 0, 0]);

        let result = FrameHeader::parse(&data, u64::MAX);
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_header_validate() {
        let (frame, _) = Frame::parse(&[0xc1, 0x00]).unwrap();
        assert!(frame.rsv1);
        assert!(matches!(frame.validate(), Err(Error::ProtocolViolation(_))));

        let mut ping = Frame::ping(b"test".to_vec());
        ping.fin = false;
        assert!(matches!(ping.validate(), Err(Error::ProtocolViolation(_))));

        let big_ping = Frame::ping(vec![0u8; 126]);
        assert!(matches!(big_ping.validate(), Err(Error::ProtocolViolation(_))));

        assert!(Frame::ping(vec![0u8; 125]).validate().is_ok());
        assert!(Frame::text(b"ok".to_vec()).validate().is_ok());
        assert!(Frame::close(Some(CloseCode::Normal), "bye").validate().is_ok());
    }

    #[test]
    fn test_write_unmasked_text_frame() {
        let buf = to_wire(&Frame::text(b"Hello".to_vec()), None);
        assert_eq!(&buf[..], &[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
    }

    #[test]
    fn test_write_masked_text_frame() {
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let buf = to_wire(&Frame::text(b"Hello".to_vec()), Some(mask));

        assert_eq!(buf.len(), 11);
        assert_eq!(buf[0], 0x81);
        assert_eq!(buf[1], 0x85);
        assert_eq!(&buf[2..6], &mask);
        assert_eq!(&buf[6..11], &[0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_write_extended_length_126() {
        let buf = to_wire(&Frame::binary(vec![0xab; 256]), None);

        assert_eq!(buf.len(), 4 + 256);
        assert_eq!(buf[0], 0x82);
        assert_eq!(buf[1], 0x7e);
        assert_eq!(&buf[2..4], &[0x01, 0x00]);
    }

    #[test]
    fn test_write_extended_length_127() {
        let buf = to_wire(&Frame::binary(vec![0xcd; 65536]), None);

        assert_eq!(buf.len(), 10 + 65536);
        assert_eq!(buf[1], 0x7f);
        assert_eq!(&buf[2..10], &65536u64.to_be_bytes());
        assert!(buf[10..].iter().all(|&b| b == 0xcd));
    }

    #[test]
    fn test_write_length_boundaries() {
        // 125 is the last single-byte length, 65535 the last 16-bit one
        assert_eq!(to_wire(&Frame::binary(vec![0; 125]), None)[1], 125);
        assert_eq!(to_wire(&Frame::binary(vec![0; 126]), None)[1], 126);
        assert_eq!(to_wire(&Frame::binary(vec![0; 65535]), None)[1], 126);
        assert_eq!(to_wire(&Frame::binary(vec![0; 65536]), None)[1], 127);
    }

    #[test]
    fn test_write_appends() {
        let mut buf = BytesMut::from(&b"xy"[..]);
        Frame::pong(Vec::new()).write(&mut buf, None);
        assert_eq!(&buf[..], &[b'x', b'y', 0x8a, 0x00]);
    }

    #[test]
    fn test_roundtrip_masked() {
        let original = Frame::text(b"Masked roundtrip test!".to_vec());
        let buf = to_wire(&original, Some([0x12, 0x34, 0x56, 0x78]));
        let (parsed, consumed) = Frame::parse(&buf).unwrap();

        assert_eq!(consumed, buf.len());
        assert_eq!(parsed.opcode, original.opcode);
        assert_eq!(parsed.payload(), original.payload());
    }

    #[test]
    fn test_wire_size() {
        let frame = Frame::text(b"Hello".to_vec());
        assert_eq!(frame.wire_size(false), 7);
        assert_eq!(frame.wire_size(true), 11);

        let frame = Frame::binary(vec![0u8; 256]);
        assert_eq!(frame.wire_size(false), 260);

        let frame = Frame::binary(vec![0u8; 65536]);
        assert_eq!(frame.wire_size(false), 65546);
        assert_eq!(frame.wire_size(true), 65550);
        assert_eq!(to_wire(&frame, None).len(), frame.wire_size(false));
    }

    #[test]
    fn test_close_frame_with_reason() {
        let frame = Frame::close(Some(CloseCode::Normal), "Normal closure");
        assert_eq!(frame.opcode, OpCode::Close);
        assert!(frame.fin);

        let payload = frame.payload();
        assert_eq!(u16::from_be_bytes([payload[0], payload[1]]), 1000);
        assert_eq!(&payload[2..], b"Normal closure");

        assert!(Frame::close(None, "ignored").payload().is_empty());
    }
}

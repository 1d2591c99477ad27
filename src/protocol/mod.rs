//! WebSocket protocol core implementation (RFC 6455).

pub mod assembler;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use assembler::MessageAssembler;
pub use decoder::Decoder;
pub use encoder::{Encoder, Fragments};
pub use frame::{Frame, FrameHeader, MAX_CONTROL_FRAME_PAYLOAD};
pub use handshake::{
    HandshakeRequest, HandshakeResponse, HeaderLookup, RequestHead, WS_GUID, bad_request,
    compute_accept_key, negotiate, rejection_response,
};
pub use mask::{apply_mask, apply_mask_fast};
pub use opcode::OpCode;

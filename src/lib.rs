//! # wsframe - Server-side WebSocket handshake and framing
//!
//! `wsframe` turns raw byte streams into RFC 6455 WebSocket connections:
//! it answers the HTTP upgrade request, decodes masked client frames,
//! reassembles fragmented messages and encodes server frames.
//!
//! ## Features
//!
//! - **Sans-I/O core**: [`Connection`] consumes and produces bytes, no I/O
//! - **Strict validation**: masking, RSV bits, control frame rules, UTF-8,
//!   close codes
//! - **Resource limits** checked before payloads are buffered
//! - **Tokio host** ([`server`], feature `async-tokio`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsframe::{Config, server};
//!
//! let mut ws = server::accept(tcp_stream, Config::default()).await?;
//! while let Some(msg) = ws.recv().await? {
//!     ws.send(msg).await?;
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;

#[cfg(feature = "async-tokio")]
pub mod server;

pub use config::{Config, Limits, Timeouts};
pub use connection::{Connection, ConnectionState};
pub use error::{Error, Result};
pub use message::{CloseCode, CloseFrame, Message};
pub use protocol::{
    Decoder, Encoder, Frame, HandshakeRequest, HandshakeResponse, HeaderLookup, OpCode,
    RequestHead, WS_GUID, compute_accept_key, negotiate, rejection_response,
};

#[cfg(feature = "async-tokio")]
pub use server::{WebSocket, accept};

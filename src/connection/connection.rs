use std::time::Instant;

use bytes::{Bytes, BytesMut};

use crate::config::Config;
use crate::connection::ConnectionState;
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::assembler::MessageAssembler;
use crate::protocol::handshake::{HeaderLookup, bad_request, negotiate};
use crate::protocol::{Decoder, Encoder, Frame, OpCode};

/// Per-connection protocol state, free of any I/O.
///
/// The host feeds received bytes in with [`decode`](Self::decode) and writes
/// whatever [`take_outgoing`](Self::take_outgoing) returns, in order. Pongs,
/// close echoes and error closes are queued automatically.
///
/// ## Example
///
/// ```
/// use wsframe::{Config, Connection, ConnectionState, Message};
///
/// let mut conn = Connection::new(Config::default());
/// let headers = [
///     ("Upgrade", "websocket"),
///     ("Connection", "Upgrade"),
///     ("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
/// ];
/// conn.handshake(&headers, None).unwrap();
/// assert_eq!(conn.state(), ConnectionState::Open);
///
/// let response = conn.take_outgoing();
/// assert!(response.starts_with(b"HTTP/1.1 101"));
///
/// // Masked "Hi" from the client
/// let frame = [0x81, 0x82, 0x01, 0x02, 0x03, 0x04, b'H' ^ 0x01, b'i' ^ 0x02];
/// let messages: Vec<_> = conn.decode(&frame).collect();
/// assert_eq!(messages, vec![Ok(Message::text("Hi"))]);
/// ```
#[derive(Debug)]
pub struct Connection {
    state: ConnectionState,
    config: Config,
    read_buf: BytesMut,
    decoder: Decoder,
    assembler: MessageAssembler,
    encoder: Encoder,
    outgoing: BytesMut,
    close_deadline: Option<Instant>,
}

impl Connection {
    /// Create a connection waiting for the upgrade request.
    pub fn new(config: Config) -> Self {
        Self {
            state: ConnectionState::AwaitingHandshake,
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            decoder: Decoder::new(&config.limits),
            assembler: MessageAssembler::new(config.limits.clone()),
            encoder: Encoder::new(config.fragment_size),
            outgoing: BytesMut::new(),
            close_deadline: None,
            config,
        }
    }

    /// Create a connection whose handshake was completed elsewhere.
    pub fn open(config: Config) -> Self {
        let mut conn = Self::new(config);
        conn.state = ConnectionState::Open;
        conn
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns `true` if messages can be sent and received.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Configuration this connection was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate the upgrade request and queue the response.
    ///
    /// On success the `101` response is queued and the connection is `Open`.
    /// `protocol` is echoed as `Sec-WebSocket-Protocol` when given.
    /// On failure a `400` response is queued instead and the connection is
    /// `Closed`; the host writes it and drops the transport.
    ///
    /// # Errors
    ///
    /// - `Error::MalformedHandshake`, `Error::MissingKey` for bad requests
    /// - `Error::InvalidHeaderValue` if `protocol` contains CR/LF
    pub fn handshake<H: HeaderLookup + ?Sized>(
        &mut self,
        headers: &H,
        protocol: Option<&str>,
    ) -> Result<()> {
        if self.state != ConnectionState::AwaitingHandshake {
            return Err(Error::MalformedHandshake(
                "Handshake already completed".into(),
            ));
        }

        let result = negotiate(headers).and_then(|response| {
            let response = match protocol {
                Some(p) => response.with_protocol(p),
                None => response,
            };
            response.to_bytes()
        });

        match result {
            Ok(bytes) => {
                self.outgoing.extend_from_slice(&bytes);
                self.state = ConnectionState::Open;
                Ok(())
            }
            Err(e) => {
                self.outgoing.extend_from_slice(&bad_request(&e.to_string()));
                self.state = ConnectionState::Closed;
                Err(e)
            }
        }
    }

    /// Append received bytes and iterate over the messages they complete.
    ///
    /// Partial frames stay buffered for the next call. After an error the
    /// iterator ends and the connection is `Closed`.
    pub fn decode(&mut self, data: &[u8]) -> Messages<'_> {
        self.feed(data);
        Messages {
            conn: self,
            done: false,
        }
    }

    /// Buffer received bytes without decoding them yet.
    pub fn feed(&mut self, data: &[u8]) {
        if self.state.is_active() {
            self.read_buf.extend_from_slice(data);
        }
    }

    /// Decode the next message from already buffered bytes.
    ///
    /// # Errors
    ///
    /// Any decoding, reassembly or close-payload error. A best-effort Close
    /// carrying the error's close code is queued and the connection is
    /// `Closed` before the error is returned.
    pub fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            match self.state {
                ConnectionState::AwaitingHandshake => {
                    return Err(Error::MalformedHandshake(
                        "Handshake not completed".into(),
                    ));
                }
                ConnectionState::CloseReceived | ConnectionState::Closed => {
                    self.read_buf.clear();
                    return Ok(None);
                }
                ConnectionState::Open | ConnectionState::CloseSent => {}
            }

            let frame = match self.decoder.decode(&mut self.read_buf) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(None),
                Err(e) => return Err(self.fail(e)),
            };

            match self.dispatch(frame) {
                Ok(Some(message)) => return Ok(Some(message)),
                Ok(None) => continue,
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    fn dispatch(&mut self, frame: Frame) -> Result<Option<Message>> {
        // Control frames may arrive between the fragments of a data message
        if frame.opcode.is_control() {
            return match frame.opcode {
                OpCode::Close => self.on_close(&frame),
                _ if self.state == ConnectionState::CloseSent => Ok(None),
                OpCode::Ping => {
                    self.encoder
                        .encode(OpCode::Pong, frame.payload(), &mut self.outgoing)?;
                    Ok(Some(Message::Ping(frame.into_payload().to_vec())))
                }
                _ => Ok(Some(Message::Pong(frame.into_payload().to_vec()))),
            };
        }

        if self.state == ConnectionState::CloseSent {
            return Ok(None);
        }
        self.assembler.push(frame)
    }

    fn on_close(&mut self, frame: &Frame) -> Result<Option<Message>> {
        let close = CloseFrame::parse(frame.payload())?;

        match self.state {
            ConnectionState::Open => {
                let echo = match close {
                    Some(ref cf) => Frame::close(Some(cf.code), ""),
                    None => Frame::close(None, ""),
                };
                echo.write(&mut self.outgoing, None);
                self.state = ConnectionState::CloseReceived;

                #[cfg(feature = "logging")]
                log::debug!("Close received ({:?}), echo queued", close.as_ref().map(|c| c.code));
            }
            _ => {
                self.state = ConnectionState::Closed;
                self.close_deadline = None;

                #[cfg(feature = "logging")]
                log::debug!("Close handshake completed");
            }
        }

        self.assembler.reset();
        self.read_buf.clear();
        Ok(Some(Message::Close(close)))
    }

    fn fail(&mut self, err: Error) -> Error {
        #[cfg(feature = "logging")]
        log::warn!("Closing connection after error: {}", err);

        if self.state == ConnectionState::Open {
            if let Some(code) = err.close_code() {
                Frame::close(Some(code), "").write(&mut self.outgoing, None);
            }
        }
        self.state = ConnectionState::Closed;
        self.close_deadline = None;
        self.assembler.reset();
        self.read_buf.clear();
        err
    }

    /// Queue an outbound message.
    ///
    /// `Message::Close` starts the close handshake like [`close`](Self::close).
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` unless the connection is `Open`
    /// - `Error::ProtocolViolation` for control payloads over 125 bytes
    /// - `Error::InvalidCloseCode` for close codes that must not be sent
    pub fn send(&mut self, message: Message) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed);
        }
        if let Message::Close(close) = message {
            return self.start_close(close, Instant::now());
        }
        self.encoder.encode_message(message, &mut self.outgoing)
    }

    /// Start the close handshake, arming a deadline of `now + close_timeout`.
    ///
    /// Closing an already closing or closed connection does nothing.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidCloseCode` for reserved or out-of-range codes
    /// - `Error::ConnectionClosed` before the handshake completed
    pub fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        self.close_at(code, reason, Instant::now())
    }

    /// [`close`](Self::close) with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// As [`close`](Self::close).
    pub fn close_at(&mut self, code: CloseCode, reason: &str, now: Instant) -> Result<()> {
        match self.state {
            ConnectionState::Open => self.start_close(Some(CloseFrame::new(code, reason)), now),
            ConnectionState::AwaitingHandshake => Err(Error::ConnectionClosed),
            _ => Ok(()),
        }
    }

    fn start_close(&mut self, close: Option<CloseFrame>, now: Instant) -> Result<()> {
        self.encoder
            .encode_message(Message::Close(close), &mut self.outgoing)?;
        self.state = ConnectionState::CloseSent;
        self.close_deadline = Some(now + self.config.close_timeout);

        #[cfg(feature = "logging")]
        log::debug!("Close sent, waiting up to {:?} for echo", self.config.close_timeout);
        Ok(())
    }

    /// When the close handshake gives up waiting for the peer, if armed.
    pub fn close_deadline(&self) -> Option<Instant> {
        self.close_deadline
    }

    /// Force `Closed` if the close deadline has passed.
    ///
    /// Returns `true` if this call closed the connection. A timeout is a
    /// normal way for the close handshake to end, not an error.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        match self.close_deadline {
            Some(deadline) if self.state == ConnectionState::CloseSent && now >= deadline => {
                #[cfg(feature = "logging")]
                log::debug!("Close handshake timed out, forcing close");

                self.state = ConnectionState::Closed;
                self.close_deadline = None;
                self.read_buf.clear();
                true
            }
            _ => false,
        }
    }

    /// Returns `true` if bytes are waiting to be written.
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Take every queued outbound byte, oldest first.
    ///
    /// Taking the queue that holds a close echo completes the close
    /// handshake.
    pub fn take_outgoing(&mut self) -> Bytes {
        if self.state == ConnectionState::CloseReceived {
            self.state = ConnectionState::Closed;
        }
        self.outgoing.split().freeze()
    }

    /// The transport went away; drop all state.
    pub fn on_disconnect(&mut self) {
        #[cfg(feature = "logging")]
        log::debug!("Transport closed in state {}", self.state);

        self.state = ConnectionState::Closed;
        self.close_deadline = None;
        self.read_buf.clear();
        self.outgoing.clear();
        self.assembler.reset();
    }
}

/// Iterator returned by [`Connection::decode`].
pub struct Messages<'a> {
    conn: &'a mut Connection,
    done: bool,
}

impl Iterator for Messages<'_> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.conn.next_message() {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

//! Tokio host: runs a [`Connection`] over an async byte stream.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tokio::net::TcpListener;
//! use wsframe::{Config, Message, server};
//!
//! # async fn run() -> wsframe::Result<()> {
//! let listener = TcpListener::bind("127.0.0.1:9001").await?;
//! let (stream, _) = listener.accept().await?;
//! let mut ws = server::accept(stream, Config::default()).await?;
//!
//! while let Some(msg) = ws.recv().await? {
//!     if msg.is_data() {
//!         ws.send(msg).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::connection::{Connection, ConnectionState};
use crate::error::{Error, Result};
use crate::message::{CloseCode, Message};
use crate::protocol::handshake::{RequestHead, bad_request};

async fn with_timeout<F, R>(limit: Option<Duration>, what: &str, fut: F) -> Result<R>
where
    F: Future<Output = Result<R>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Io(format!("{} timed out after {:?}", what, limit)))?,
        None => fut.await,
    }
}

/// Perform the server side of the opening handshake on `io`.
///
/// Equivalent to [`accept_with`] choosing no subprotocol.
///
/// # Errors
///
/// See [`accept_with`].
pub async fn accept<T>(io: T, config: Config) -> Result<WebSocket<T>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    accept_with(io, config, |_| None).await
}

/// Perform the opening handshake, letting `select_protocol` pick the
/// `Sec-WebSocket-Protocol` to echo from the parsed request.
///
/// Plain HTTP requests and failed negotiations are answered with `400 Bad
/// Request` before the error is returned. Bytes the client sent after the
/// request head are kept and decoded by the first [`WebSocket::recv`].
///
/// # Errors
///
/// - `Error::MalformedHandshake`, `Error::MissingKey` for rejected requests
/// - `Error::ConnectionClosed` if the client hung up mid-request
/// - `Error::Io` on transport failure or handshake timeout
pub async fn accept_with<T, F>(io: T, config: Config, select_protocol: F) -> Result<WebSocket<T>>
where
    T: AsyncRead + AsyncWrite + Unpin,
    F: FnOnce(&RequestHead) -> Option<String>,
{
    let limit = config.timeouts.as_ref().map(|t| t.handshake);
    with_timeout(limit, "Handshake", handshake(io, config, select_protocol)).await
}

async fn handshake<T, F>(mut io: T, config: Config, select_protocol: F) -> Result<WebSocket<T>>
where
    T: AsyncRead + AsyncWrite + Unpin,
    F: FnOnce(&RequestHead) -> Option<String>,
{
    let max_size = config.limits.max_handshake_size;
    let mut buf = BytesMut::with_capacity(max_size.min(config.read_buffer_size));

    let (head, consumed) = loop {
        match RequestHead::parse(&buf, max_size) {
            Ok(Some(parsed)) => break parsed,
            Ok(None) => {}
            Err(e) => return Err(reject(&mut io, e).await),
        }
        if io.read_buf(&mut buf).await? == 0 {
            return Err(Error::ConnectionClosed);
        }
    };

    if !head.is_upgrade() {
        let err = Error::MalformedHandshake("Not a websocket request".into());
        return Err(reject(&mut io, err).await);
    }

    let protocol = select_protocol(&head);
    let mut conn = Connection::new(config);
    let negotiated = conn.handshake(&head, protocol.as_deref());

    let response = conn.take_outgoing();
    io.write_all(&response).await?;
    io.flush().await?;

    if let Err(e) = negotiated {
        let _ = io.shutdown().await;
        return Err(e);
    }

    #[cfg(feature = "logging")]
    log::debug!("WebSocket connection accepted on {}", head.path);

    conn.feed(&buf[consumed..]);
    let read_buf = vec![0u8; conn.config().read_buffer_size.max(1)];
    Ok(WebSocket {
        io,
        conn,
        read_buf,
        shutdown: false,
    })
}

async fn reject<T>(io: &mut T, err: Error) -> Error
where
    T: AsyncWrite + Unpin,
{
    #[cfg(feature = "logging")]
    log::warn!("Rejecting upgrade request: {}", err);

    let body = match &err {
        Error::MalformedHandshake(reason) => reason.clone(),
        other => other.to_string(),
    };
    let _ = io.write_all(&bad_request(&body)).await;
    let _ = io.shutdown().await;
    err
}

/// An accepted WebSocket over the stream `T`.
pub struct WebSocket<T> {
    io: T,
    conn: Connection,
    read_buf: Vec<u8>,
    shutdown: bool,
}

impl<T> WebSocket<T> {
    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    /// The protocol state machine driving this socket.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.io
    }

    /// Give the underlying stream back.
    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> WebSocket<T> {
    /// Receive the next message.
    ///
    /// Pongs and close echoes queued while decoding are written before this
    /// returns. Returns `Ok(None)` once the connection is closed or the peer
    /// hung up.
    ///
    /// # Errors
    ///
    /// Protocol errors after a best-effort Close carrying the matching close
    /// code has been sent, or `Error::Io` on transport failure.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        loop {
            match self.conn.next_message() {
                Ok(Some(message)) => {
                    self.flush().await?;
                    return Ok(Some(message));
                }
                Ok(None) => self.flush().await?,
                Err(e) => {
                    let _ = self.flush().await;
                    return Err(e);
                }
            }

            if !self.conn.state().can_receive() {
                return Ok(None);
            }

            let read_limit = self.conn.config().timeouts.as_ref().map(|t| t.read);
            let n = match with_timeout(read_limit, "Read", async {
                Ok::<_, Error>(self.io.read(&mut self.read_buf).await?)
            })
            .await
            {
                Ok(n) => n,
                Err(e) => {
                    self.conn.on_disconnect();
                    return Err(e);
                }
            };

            if n == 0 {
                self.conn.on_disconnect();
                return Ok(None);
            }
            self.conn.feed(&self.read_buf[..n]);
        }
    }

    /// Send a message, fragmenting data per [`Config::fragment_size`].
    ///
    /// Sending `Message::Close` starts the close handshake without waiting
    /// for the echo; [`close`](Self::close) waits.
    ///
    /// # Errors
    ///
    /// As [`Connection::send`], plus `Error::Io` on transport failure.
    pub async fn send(&mut self, message: Message) -> Result<()> {
        self.conn.send(message)?;
        self.flush().await
    }

    /// Close the connection and wait up to `close_timeout` for the peer's
    /// Close before shutting the transport down.
    ///
    /// A peer that never answers is not an error.
    ///
    /// # Errors
    ///
    /// `Error::InvalidCloseCode` for codes that must not be sent, or
    /// `Error::Io` if the Close cannot be written.
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        self.conn.close(code, reason)?;
        self.flush().await?;

        if self.conn.state() == ConnectionState::CloseSent {
            let wait = self.conn.config().close_timeout;
            if tokio::time::timeout(wait, self.await_close()).await.is_err() {
                if let Some(deadline) = self.conn.close_deadline() {
                    self.conn.poll_timeout(deadline);
                }
            }
        }

        self.finish().await;
        Ok(())
    }

    async fn await_close(&mut self) {
        while self.conn.state() == ConnectionState::CloseSent {
            match self.recv().await {
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
    }

    async fn flush(&mut self) -> Result<()> {
        if self.conn.has_outgoing() {
            let bytes = self.conn.take_outgoing();
            let write_limit = self.conn.config().timeouts.as_ref().map(|t| t.write);
            let io = &mut self.io;
            let written = with_timeout(write_limit, "Write", async {
                io.write_all(&bytes).await?;
                io.flush().await?;
                Ok::<_, Error>(())
            })
            .await;

            if let Err(e) = written {
                self.conn.on_disconnect();
                return Err(e);
            }
        }

        if self.conn.state() == ConnectionState::Closed {
            self.finish().await;
        }
        Ok(())
    }

    async fn finish(&mut self) {
        if !self.shutdown {
            self.shutdown = true;
            let _ = self.io.shutdown().await;
        }
    }
}

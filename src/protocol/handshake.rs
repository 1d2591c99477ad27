//! WebSocket opening handshake, server side (RFC 6455 Section 4.2).
//!
//! The negotiator only needs a way to look headers up by name. Hosts that
//! already parsed the request hand over their header map; hosts working on
//! raw bytes can use [`RequestHead::parse`] first.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this crate speaks.
pub const WS_VERSION: &str = "13";

/// Headers whose repetition makes a request ambiguous.
const SINGLETON_HEADERS: [&str; 4] = [
    "upgrade",
    "connection",
    "sec-websocket-key",
    "sec-websocket-version",
];

/// Case-insensitive header lookup.
pub trait HeaderLookup {
    /// Value of the first header named `name`, compared ASCII case-insensitively.
    fn header(&self, name: &str) -> Option<&str>;
}

impl<S: std::hash::BuildHasher> HeaderLookup for HashMap<String, String, S> {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name)
            .or_else(|| {
                self.iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }
}

impl HeaderLookup for [(&str, &str)] {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }
}

impl<const N: usize> HeaderLookup for [(&str, &str); N] {
    fn header(&self, name: &str) -> Option<&str> {
        self.as_slice().header(name)
    }
}

/// Validate that a header value does not contain CR or LF characters.
///
/// # Errors
/// Returns `Error::InvalidHeaderValue` if the value contains `\r` or `\n`.
fn validate_header_value(header_name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue {
            header: header_name.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wsframe::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    BASE64.encode(hash)
}

/// Raw HTTP/1.1 request head read off the wire before the upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Request target, e.g. `/chat`.
    pub path: String,
    /// HTTP version token, e.g. `HTTP/1.1`.
    pub version: String,
    /// Header name/value pairs in arrival order, values trimmed.
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Parse a request head terminated by an empty line.
    ///
    /// Returns `Ok(None)` while the terminating CRLFCRLF has not arrived yet,
    /// otherwise the head and the number of bytes it occupied. Bytes after
    /// that offset belong to the WebSocket stream.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedHandshake` if the head exceeds `max_size`,
    /// is not UTF-8, has a malformed request line or header line, or repeats
    /// one of the upgrade headers.
    pub fn parse(data: &[u8], max_size: usize) -> Result<Option<(Self, usize)>> {
        let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
            if data.len() > max_size {
                return Err(Error::MalformedHandshake(format!(
                    "Request head too large: more than {} bytes",
                    max_size
                )));
            }
            return Ok(None);
        };
        let consumed = end + 4;
        if consumed > max_size {
            return Err(Error::MalformedHandshake(format!(
                "Request head too large: {} bytes (max: {})",
                consumed, max_size
            )));
        }

        let text = std::str::from_utf8(&data[..end])
            .map_err(|_| Error::MalformedHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(path), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::MalformedHandshake(format!(
                "Invalid request line: {:?}",
                request_line
            )));
        };
        if !version.starts_with("HTTP/") {
            return Err(Error::MalformedHandshake(format!(
                "Invalid HTTP version: {}",
                version
            )));
        }

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                return Err(Error::MalformedHandshake(format!(
                    "Invalid header line: {:?}",
                    line
                )));
            };
            let name = name.trim();
            let lower = name.to_ascii_lowercase();
            if SINGLETON_HEADERS.contains(&lower.as_str())
                && headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
            {
                return Err(Error::MalformedHandshake(format!(
                    "Duplicate header: {}",
                    name
                )));
            }
            headers.push((name.to_string(), value.trim().to_string()));
        }

        Ok(Some((
            Self {
                method: method.to_string(),
                path: path.to_string(),
                version: version.to_string(),
                headers,
            },
            consumed,
        )))
    }

    /// Returns `true` if this is a `GET` carrying an `Upgrade` header.
    ///
    /// Anything else is plain HTTP and should be answered with
    /// [`rejection_response`] rather than negotiated.
    #[must_use]
    pub fn is_upgrade(&self) -> bool {
        self.method == "GET" && self.header("upgrade").is_some()
    }
}

impl HeaderLookup for RequestHead {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Validated view of a client's upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// The Sec-WebSocket-Key header value, opaque.
    pub key: String,
    /// The Sec-WebSocket-Version value, if sent.
    pub version: Option<String>,
    /// The Sec-WebSocket-Protocol values offered by the client.
    pub protocols: Vec<String>,
}

impl HandshakeRequest {
    /// Validate the upgrade headers and extract the handshake fields.
    ///
    /// # Errors
    ///
    /// - `Error::MalformedHandshake` if `Upgrade` is not `websocket`,
    ///   `Connection` lacks the `Upgrade` token, or a version other than 13
    ///   was requested
    /// - `Error::MissingKey` if `Sec-WebSocket-Key` is absent or empty
    pub fn from_headers<H: HeaderLookup + ?Sized>(headers: &H) -> Result<Self> {
        let upgrade = headers
            .header("upgrade")
            .ok_or_else(|| Error::MalformedHandshake("Missing Upgrade header".into()))?;
        if !upgrade.trim().eq_ignore_ascii_case("websocket") {
            return Err(Error::MalformedHandshake(format!(
                "Invalid Upgrade header: {}",
                upgrade
            )));
        }

        let connection = headers
            .header("connection")
            .ok_or_else(|| Error::MalformedHandshake("Missing Connection header".into()))?;
        if !connection
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        {
            return Err(Error::MalformedHandshake(format!(
                "Invalid Connection header: {}",
                connection
            )));
        }

        let key = headers
            .header("sec-websocket-key")
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(Error::MissingKey)?
            .to_string();

        let version = headers
            .header("sec-websocket-version")
            .map(|v| v.trim().to_string());
        if let Some(ref v) = version {
            if v != WS_VERSION {
                return Err(Error::MalformedHandshake(format!(
                    "Unsupported WebSocket version: {} (expected 13)",
                    v
                )));
            }
        }

        let protocols = headers
            .header("sec-websocket-protocol")
            .map(|p| {
                p.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            key,
            version,
            protocols,
        })
    }
}

/// The server's `101 Switching Protocols` answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
    /// Subprotocol chosen by the host, echoed verbatim.
    pub protocol: Option<String>,
}

impl HandshakeResponse {
    /// Create a handshake response from a validated request.
    ///
    /// No subprotocol is selected; see [`with_protocol`](Self::with_protocol).
    #[must_use]
    pub fn from_request(req: &HandshakeRequest) -> Self {
        Self {
            accept: compute_accept_key(&req.key),
            protocol: None,
        }
    }

    /// Add a `Sec-WebSocket-Protocol` header to the response.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Write the HTTP response to a buffer.
    ///
    /// # Errors
    /// Returns `Error::InvalidHeaderValue` if the protocol contains CR/LF.
    /// Nothing is written in that case.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        if let Some(ref proto) = self.protocol {
            validate_header_value("Sec-WebSocket-Protocol", proto)?;
        }

        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());

        if let Some(ref proto) = self.protocol {
            buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {}\r\n", proto).as_bytes());
        }

        buf.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Serialize to a fresh buffer.
    ///
    /// # Errors
    /// As [`write`](Self::write).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(160);
        self.write(&mut buf)?;
        Ok(buf)
    }
}

/// Validate an upgrade request and build the `101` response.
///
/// # Errors
///
/// Returns `Error::MalformedHandshake` or `Error::MissingKey`; the caller
/// answers with [`rejection_response`] and closes the transport.
pub fn negotiate<H: HeaderLookup + ?Sized>(headers: &H) -> Result<HandshakeResponse> {
    match HandshakeRequest::from_headers(headers) {
        Ok(request) => {
            #[cfg(feature = "logging")]
            log::debug!("WebSocket handshake accepted");
            Ok(HandshakeResponse::from_request(&request))
        }
        Err(e) => {
            #[cfg(feature = "logging")]
            log::warn!("WebSocket handshake rejected: {}", e);
            Err(e)
        }
    }
}

/// Build a plain-text HTTP error response that closes the connection.
///
/// CR and LF are stripped from `reason` so it cannot break the status line.
#[must_use]
pub fn rejection_response(status: u16, reason: &str, body: &str) -> Vec<u8> {
    let reason: String = reason.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    )
    .into_bytes()
}

/// `400 Bad Request` with `body` as the explanation.
#[must_use]
pub fn bad_request(body: &str) -> Vec<u8> {
    rejection_response(400, "Bad Request", body)
}

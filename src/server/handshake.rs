// Source client handshake
//
// Broadcast software connects the way it would to an Icecast server:
//
//   SOURCE /mount ICE/1.0        (legacy, no response headers expected)
//   PUT /mount HTTP/1.1          (newer clients, may send Expect: 100-continue)
//
// followed by headers and a blank line. After the response the connection
// carries nothing but the Ogg stream until the client goes away.

use std::borrow::Cow;
use std::io::{self, Read, Write};

use thiserror::Error;

/// Largest request head accepted
pub const MAX_HEAD_SIZE: usize = 8 * 1024;

/// Most headers accepted in a request head
pub const MAX_HEADERS: usize = 64;

/// Protocol token of legacy source clients
const ICE_PROTOCOL: &str = "ICE/1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMethod {
    Source,
    Put,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    pub method: SourceMethod,
    pub mount: String,
    pub protocol: String,
    pub headers: Vec<(String, String)>,
}

impl SourceRequest {
    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("User-Agent")
    }

    pub fn expects_continue(&self) -> bool {
        self.header("Expect").is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
    }
}

/// A parsed request head and whatever body bytes arrived with it
#[derive(Debug)]
pub struct SourceHead {
    pub request: SourceRequest,
    /// Start of the stream, read along with the head
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("connection closed before the request head was complete")]
    Incomplete,

    #[error("request head exceeds {0} bytes")]
    TooLarge(usize),

    #[error("request head has more than {0} headers")]
    TooManyHeaders(usize),

    #[error("malformed request head: {0}")]
    Malformed(httparse::Error),

    #[error("unsupported method {0}")]
    UnsupportedMethod(String),

    #[error("handshake I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Read and parse the request head.
///
/// Bytes after the blank line are returned in [`SourceHead::body`]; the
/// stream continues with them.
pub fn read_request<R: Read>(reader: &mut R) -> Result<SourceHead, HandshakeError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let head_len = loop {
        if let Some(end) = head_end(&buf) {
            break end;
        }
        if buf.len() >= MAX_HEAD_SIZE {
            return Err(HandshakeError::TooLarge(MAX_HEAD_SIZE));
        }
        let want = chunk.len().min(MAX_HEAD_SIZE - buf.len());
        match reader.read(&mut chunk[..want]) {
            Ok(0) => return Err(HandshakeError::Incomplete),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    };

    let request = parse_head(&buf[..head_len])?;
    let body = buf.split_off(head_len);
    Ok(SourceHead { request, body })
}

fn parse_head(head: &[u8]) -> Result<SourceRequest, HandshakeError> {
    let (head, legacy) = as_http(head);
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);
    match parsed.parse(&head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => return Err(HandshakeError::Incomplete),
        Err(httparse::Error::TooManyHeaders) => return Err(HandshakeError::TooManyHeaders(MAX_HEADERS)),
        Err(e) => return Err(HandshakeError::Malformed(e)),
    }

    let method = match parsed.method.unwrap_or_default() {
        m if m.eq_ignore_ascii_case("SOURCE") => SourceMethod::Source,
        m if m.eq_ignore_ascii_case("PUT") => SourceMethod::Put,
        other => return Err(HandshakeError::UnsupportedMethod(other.to_string())),
    };
    let protocol = if legacy {
        ICE_PROTOCOL.to_string()
    } else {
        format!("HTTP/1.{}", parsed.version.unwrap_or(0))
    };
    let headers = parsed
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).trim().to_string()))
        .collect();

    Ok(SourceRequest {
        method,
        mount: parsed.path.unwrap_or("/").to_string(),
        protocol,
        headers,
    })
}

/// httparse only knows HTTP versions, so a legacy `ICE/1.0` request line is
/// rewritten to `HTTP/1.0` before parsing
fn as_http(head: &[u8]) -> (Cow<'_, [u8]>, bool) {
    let line_end = head.iter().position(|&b| b == b'\n').unwrap_or(head.len());
    let line = head[..line_end].strip_suffix(b"\r").unwrap_or(&head[..line_end]);
    let Some(start) = line.strip_suffix(ICE_PROTOCOL.as_bytes()) else {
        return (Cow::Borrowed(head), false);
    };

    let mut rewritten = Vec::with_capacity(head.len() + 1);
    rewritten.extend_from_slice(start);
    rewritten.extend_from_slice(b"HTTP/1.0");
    rewritten.extend_from_slice(&head[line.len()..]);
    (Cow::Owned(rewritten), true)
}

/// Length of the head including its blank line, once it is all in `buf`
fn head_end(buf: &[u8]) -> Option<usize> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4);
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| i + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Tell the client to start streaming
pub fn accept<W: Write>(writer: &mut W, request: &SourceRequest) -> io::Result<()> {
    match request.method {
        SourceMethod::Source => writer.write_all(b"HTTP/1.0 200 OK\r\n\r\n")?,
        SourceMethod::Put => {
            if request.expects_continue() {
                writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n")?;
            }
            writer.write_all(b"HTTP/1.1 200 OK\r\n\r\n")?;
        }
    }
    writer.flush()
}

/// Turn away a request this endpoint does not serve
pub fn reject<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(b"HTTP/1.0 405 Method Not Allowed\r\nAllow: SOURCE, PUT\r\n\r\n")?;
    writer.flush()
}

//! Minimal HTTP/1.1 server-side codec.
//!
//! Just enough HTTP for browsers and `curl` on a LAN:
//!
//! - one request per connection, every response carries `Connection: close`
//! - request bodies are delimited by `Content-Length` only; chunked uploads
//!   are refused with `411 Length Required`
//! - the request head is bounded, the body is read by the handler so it can
//!   decide how much to allocate
//!
//! Handlers receive a parsed [`Request`] plus a reader limited to the
//! declared body length, and return a [`Response`].

use lanshare_core::{ApiResponse, Payload};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Cookie carrying the capability token.
pub const AUTH_COOKIE: &str = "ak";

/// Interim response releasing a body held back by `Expect: 100-continue`.
pub const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Errors while reading a request head.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Peer closed the connection before sending anything
    #[error("connection closed before request")]
    Closed,

    /// Request head larger than the configured limit
    #[error("request head exceeds {limit} bytes")]
    HeadTooLarge {
        /// Configured limit in bytes
        limit: usize,
    },

    /// Request line or header could not be parsed
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Body framing other than `Content-Length`
    #[error("unsupported transfer encoding")]
    UnsupportedTransferEncoding,

    /// Socket error
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl HttpError {
    /// Response to send before closing, if the peer can still receive one.
    pub fn response(&self) -> Option<Response> {
        match self {
            Self::Closed | Self::Io(_) => None,
            Self::HeadTooLarge { .. } => Some(Response::empty(Status::HeaderFieldsTooLarge)),
            Self::Malformed(_) => Some(Response::empty(Status::BadRequest)),
            Self::UnsupportedTransferEncoding => Some(Response::empty(Status::LengthRequired)),
        }
    }
}

/// A parsed request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Method, as sent (`GET`, `POST`, ...)
    pub method: String,
    /// Percent-decoded path
    pub path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

impl Request {
    /// Build a request from a method and an origin-form target
    /// (`/path?query`).
    pub fn new(method: &str, target: &str) -> Result<Self, HttpError> {
        if !target.starts_with('/') {
            return Err(HttpError::Malformed(format!("unsupported request target: {target}")));
        }
        let (raw_path, raw_query) = target.split_once('?').unwrap_or((target, ""));
        Ok(Self {
            method: method.to_string(),
            path: percent_decode(raw_path, false),
            query: parse_urlencoded(raw_query),
            headers: Vec::new(),
        })
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    /// Value of a cookie from the `Cookie` header(s).
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
            .flat_map(|(_, v)| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim_matches('"'))
    }

    /// Declared body length.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Malformed` if the header is not a decimal number.
    pub fn content_length(&self) -> Result<Option<u64>, HttpError> {
        self.header("content-length")
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .map_err(|_| HttpError::Malformed(format!("invalid content-length: {v}")))
            })
            .transpose()
    }

    /// Returns `true` for `Transfer-Encoding` other than `identity`.
    pub fn has_transfer_encoding(&self) -> bool {
        self.header("transfer-encoding").is_some_and(|v| !v.trim().eq_ignore_ascii_case("identity"))
    }

    /// Returns `true` if the client waits for `100 Continue` before sending
    /// the body.
    pub fn expects_continue(&self) -> bool {
        self.header("expect").is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"))
    }

    /// Returns `true` for `HEAD` requests, whose responses carry no body.
    pub fn is_head(&self) -> bool {
        self.method.eq_ignore_ascii_case("HEAD")
    }
}

/// Read a request head (request line and headers) from `reader`.
///
/// At most `max_head_bytes` are consumed; body bytes stay buffered in
/// `reader`.
pub async fn read_request<R>(reader: &mut R, max_head_bytes: usize) -> Result<Request, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let limit = max_head_bytes;
    let mut limited = (&mut *reader).take(limit as u64);
    let mut line = String::new();
    let mut request: Option<Request> = None;
    let mut consumed = 0usize;

    loop {
        line.clear();
        let n = limited.read_line(&mut line).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                HttpError::Malformed("request head is not UTF-8".to_string())
            } else {
                HttpError::Io(e)
            }
        })?;
        consumed += n;

        if !line.ends_with('\n') {
            return Err(if limited.limit() == 0 {
                HttpError::HeadTooLarge { limit }
            } else if consumed == 0 {
                HttpError::Closed
            } else {
                HttpError::Malformed("connection closed mid-head".to_string())
            });
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        match request.as_mut() {
            // Tolerate empty lines before the request line
            None if trimmed.is_empty() => {},
            None => request = Some(parse_request_line(trimmed)?),
            Some(_) if trimmed.is_empty() => break,
            Some(req) => {
                let (name, value) = parse_header_line(trimmed)?;
                req.headers.push((name, value));
            },
        }
    }

    request.ok_or_else(|| HttpError::Malformed("missing request line".to_string()))
}

fn parse_request_line(line: &str) -> Result<Request, HttpError> {
    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::Malformed(format!("bad request line: {line}")));
    };
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::Malformed(format!("unsupported version: {version}")));
    }
    Request::new(method, target)
}

fn parse_header_line(line: &str) -> Result<(String, String), HttpError> {
    if line.starts_with([' ', '\t']) {
        return Err(HttpError::Malformed("obsolete header folding".to_string()));
    }
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| HttpError::Malformed(format!("bad header line: {line}")))?;
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(HttpError::Malformed(format!("bad header name: {name}")));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parse `application/x-www-form-urlencoded` data (also used for query
/// strings). Empty pairs are skipped; a key without `=` gets an empty value.
pub fn parse_urlencoded(input: &str) -> Vec<(String, String)> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(k, true), percent_decode(v, true))
        })
        .collect()
}

/// Decode `%XX` escapes. Malformed escapes are kept literally and invalid
/// UTF-8 is replaced.
pub fn percent_decode(input: &str, plus_as_space: bool) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                        continue;
                    },
                    _ => out.push(b'%'),
                }
            },
            b'+' if plus_as_space => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Encode everything outside the RFC 3986 unreserved set.
pub fn percent_encode(input: &str) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    char::from(b).to_digit(16).and_then(|d| u8::try_from(d).ok())
}

/// Response status codes used by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 200
    Ok,
    /// 303
    SeeOther,
    /// 400
    BadRequest,
    /// 404
    NotFound,
    /// 405
    MethodNotAllowed,
    /// 411
    LengthRequired,
    /// 431
    HeaderFieldsTooLarge,
    /// 500
    InternalServerError,
    /// 503
    ServiceUnavailable,
}

impl Status {
    /// Numeric code.
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::SeeOther => 303,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::LengthRequired => 411,
            Self::HeaderFieldsTooLarge => 431,
            Self::InternalServerError => 500,
            Self::ServiceUnavailable => 503,
        }
    }

    /// Reason phrase.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::SeeOther => "See Other",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::LengthRequired => "Length Required",
            Self::HeaderFieldsTooLarge => "Request Header Fields Too Large",
            Self::InternalServerError => "Internal Server Error",
            Self::ServiceUnavailable => "Service Unavailable",
        }
    }
}

/// Response body. File content stays a [`Payload`] so the copy is scrubbed
/// once the response is dropped.
#[derive(Debug, Default)]
pub enum Body {
    /// No body
    #[default]
    Empty,
    /// Plain bytes
    Bytes(Vec<u8>),
    /// Downloaded file content
    Payload(Payload),
}

impl Body {
    /// Body bytes.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::Bytes(bytes) => bytes,
            Self::Payload(payload) => payload.as_slice(),
        }
    }
}

/// An HTTP response.
#[derive(Debug)]
pub struct Response {
    status: Status,
    headers: Vec<(&'static str, String)>,
    body: Body,
}

impl Response {
    /// Response without a body.
    pub fn empty(status: Status) -> Self {
        Self { status, headers: Vec::new(), body: Body::Empty }
    }

    /// Response with a body of the given content type.
    pub fn with_body(status: Status, content_type: &str, body: Body) -> Self {
        Self { status, headers: vec![("Content-Type", content_type.to_string())], body }
    }

    /// `200` with a JSON API response.
    pub fn json(response: &ApiResponse) -> Self {
        match serde_json::to_vec(response) {
            Ok(bytes) => Self::with_body(Status::Ok, "application/json", Body::Bytes(bytes)),
            Err(e) => {
                tracing::error!("failed to serialize API response: {}", e);
                Self::empty(Status::InternalServerError)
            },
        }
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Status code.
    pub fn status(&self) -> Status {
        self.status
    }

    /// First value of a header, matched case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    /// Body bytes.
    pub fn body(&self) -> &[u8] {
        self.body.as_slice()
    }

    /// Serialize onto the wire. `Content-Length` always reflects the body,
    /// even when `include_body` is false (HEAD).
    pub async fn write_to<W>(&self, writer: &mut W, include_body: bool) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        use std::fmt::Write;

        let body = self.body.as_slice();
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status.code(), self.status.reason());
        for (name, value) in &self.headers {
            let _ = write!(head, "{name}: {value}\r\n");
        }
        let _ = write!(head, "Content-Length: {}\r\nConnection: close\r\n\r\n", body.len());

        writer.write_all(head.as_bytes()).await?;
        if include_body {
            writer.write_all(body).await?;
        }
        writer.flush().await
    }
}

//! Interception protocol framing.
//!
//! # Responsibilities
//! - Read one request: ICAP head, encapsulated HTTP head, chunked body
//! - Honour `Preview`: a preview ends at the first zero chunk, optionally
//!   flagged `ieof`
//! - Encode responses with a computed `Encapsulated` header
//!
//! # Wire Shape
//! ```text
//! REQMOD icap://proxy/icap ICAP/1.0\r\n
//! Encapsulated: req-hdr=0, req-body=<n>\r\n
//! \r\n
//! <n bytes of HTTP request head>
//! <hex size>\r\n<data>\r\n ... 0[; ieof]\r\n\r\n
//! ```

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

pub const ICAP_VERSION: &str = "ICAP/1.0";

/// Interim response sent when the rest of a previewed body is needed.
pub const CONTINUE: &[u8] = b"ICAP/1.0 100 Continue\r\n\r\n";

const MAX_HEAD_BYTES: usize = 64 * 1024;
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum IcapError {
    #[error("connection i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed mid-message")]
    UnexpectedEof,

    #[error("malformed request line: {0:?}")]
    RequestLine(String),

    #[error("unsupported protocol version {0:?}")]
    Version(String),

    #[error("malformed header line: {0:?}")]
    Header(String),

    #[error("malformed Encapsulated header: {0:?}")]
    Encapsulated(String),

    #[error("malformed chunk: {0:?}")]
    Chunk(String),

    #[error("{what} exceeds {limit} bytes")]
    TooLarge { what: &'static str, limit: usize },

    #[error("malformed encapsulated http message: {0}")]
    Http(String),
}

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Parsed `Encapsulated` header: section name → byte offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Encapsulated {
    pub req_hdr: Option<usize>,
    pub req_body: Option<usize>,
    pub res_hdr: Option<usize>,
    pub res_body: Option<usize>,
    pub null_body: Option<usize>,
}

impl Encapsulated {
    pub fn parse(value: &str) -> Result<Self, IcapError> {
        let bad = || IcapError::Encapsulated(value.to_string());
        let mut parsed = Self::default();

        for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, offset) = entry.split_once('=').ok_or_else(bad)?;
            let offset: usize = offset.trim().parse().map_err(|_| bad())?;
            let slot = match name.trim().to_ascii_lowercase().as_str() {
                "req-hdr" => &mut parsed.req_hdr,
                "req-body" => &mut parsed.req_body,
                "res-hdr" => &mut parsed.res_hdr,
                "res-body" => &mut parsed.res_body,
                "null-body" | "opt-body" => &mut parsed.null_body,
                _ => return Err(bad()),
            };
            *slot = Some(offset);
        }
        Ok(parsed)
    }

    /// Length of the encapsulated HTTP request head, if one is present.
    pub fn request_head_len(&self) -> Result<Option<usize>, IcapError> {
        let Some(start) = self.req_hdr else {
            return Ok(None);
        };
        let end = self
            .req_body
            .or(self.null_body)
            .ok_or_else(|| IcapError::Encapsulated("req-hdr without a following section".into()))?;
        end.checked_sub(start)
            .map(Some)
            .ok_or_else(|| IcapError::Encapsulated("sections out of order".into()))
    }

    pub fn has_request_body(&self) -> bool {
        self.req_body.is_some()
    }
}

/// Request line plus ICAP headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcapHead {
    pub method: String,
    pub uri: String,
    pub headers: Headers,
}

impl IcapHead {
    pub fn encapsulated(&self) -> Result<Encapsulated, IcapError> {
        match self.headers.get("encapsulated") {
            Some(value) => Encapsulated::parse(value),
            None => Ok(Encapsulated::default()),
        }
    }

    pub fn preview(&self) -> Option<usize> {
        self.headers.get("preview")?.trim().parse().ok()
    }

    pub fn wants_close(&self) -> bool {
        self.headers
            .get("connection")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("close"))
    }
}

/// A fully framed request.
#[derive(Debug, Clone)]
pub struct IcapRequest {
    pub head: IcapHead,
    /// Raw HTTP request head, including the terminating blank line.
    pub http_head: Option<Bytes>,
    /// De-chunked body received so far.
    pub body: BytesMut,
    /// False while a preview was sent and more body remains with the client.
    pub complete: bool,
}

/// Read the next request; `None` on a clean close between messages.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<IcapRequest>, IcapError>
where
    R: AsyncBufRead + Unpin,
{
    let Some(head) = read_head(reader).await? else {
        return Ok(None);
    };
    let encapsulated = head.encapsulated()?;

    let http_head = match encapsulated.request_head_len()? {
        Some(len) => Some(read_exact(reader, len).await?),
        None => None,
    };

    let mut body = BytesMut::new();
    let mut complete = true;
    if encapsulated.has_request_body() {
        let ieof = read_chunks(reader, &mut body).await?;
        complete = head.preview().is_none() || ieof;
    }

    Ok(Some(IcapRequest {
        head,
        http_head,
        body,
        complete,
    }))
}

/// Read the body remaining after a `100 Continue`.
pub async fn read_remaining<R>(reader: &mut R, request: &mut IcapRequest) -> Result<(), IcapError>
where
    R: AsyncBufRead + Unpin,
{
    if !request.complete {
        read_chunks(reader, &mut request.body).await?;
        request.complete = true;
    }
    Ok(())
}

async fn read_head<R>(reader: &mut R) -> Result<Option<IcapHead>, IcapError>
where
    R: AsyncBufRead + Unpin,
{
    let mut budget = MAX_HEAD_BYTES;

    // Tolerate stray blank lines between messages.
    let request_line = loop {
        match read_line(reader, &mut budget).await? {
            None => return Ok(None),
            Some(line) if line.is_empty() => continue,
            Some(line) => break line,
        }
    };

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(uri), Some(version), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(IcapError::RequestLine(request_line.clone()));
    };
    if !version.eq_ignore_ascii_case(ICAP_VERSION) {
        return Err(IcapError::Version(version.to_string()));
    }
    let (method, uri) = (method.to_ascii_uppercase(), uri.to_string());

    let mut headers = Headers::new();
    loop {
        let line = read_line(reader, &mut budget).await?.ok_or(IcapError::UnexpectedEof)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| IcapError::Header(line.clone()))?;
        headers.push(name.trim(), value.trim());
    }

    Ok(Some(IcapHead { method, uri, headers }))
}

/// Read chunks into `body` up to the zero chunk. Returns whether it carried `ieof`.
async fn read_chunks<R>(reader: &mut R, body: &mut BytesMut) -> Result<bool, IcapError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut budget = MAX_HEAD_BYTES;
        let line = read_line(reader, &mut budget).await?.ok_or(IcapError::UnexpectedEof)?;
        let (size, extension) = match line.split_once(';') {
            Some((size, ext)) => (size.trim(), Some(ext.trim())),
            None => (line.trim(), None),
        };
        let size = usize::from_str_radix(size, 16).map_err(|_| IcapError::Chunk(line.clone()))?;

        if size == 0 {
            // Trailer section ends at the first blank line.
            while !read_line(reader, &mut budget).await?.ok_or(IcapError::UnexpectedEof)?.is_empty() {}
            return Ok(extension.is_some_and(|ext| ext.eq_ignore_ascii_case("ieof")));
        }

        if body.len().checked_add(size).filter(|n| *n <= MAX_BODY_BYTES).is_none() {
            return Err(IcapError::TooLarge {
                what: "encapsulated body",
                limit: MAX_BODY_BYTES,
            });
        }
        body.extend_from_slice(&read_exact(reader, size).await?);

        let terminator = read_line(reader, &mut budget).await?.ok_or(IcapError::UnexpectedEof)?;
        if !terminator.is_empty() {
            return Err(IcapError::Chunk(terminator));
        }
    }
}

/// Read one CRLF (or bare LF) terminated line without its terminator.
///
/// At most `budget` bytes are buffered; a line that does not end within it
/// is `TooLarge`.
async fn read_line<R>(reader: &mut R, budget: &mut usize) -> Result<Option<String>, IcapError>
where
    R: AsyncBufRead + Unpin,
{
    let too_large = IcapError::TooLarge {
        what: "message head",
        limit: MAX_HEAD_BYTES,
    };

    let mut buf = Vec::new();
    let limit = u64::try_from(*budget).unwrap_or(u64::MAX).saturating_add(1);
    let read = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        return Err(if read > *budget { too_large } else { IcapError::UnexpectedEof });
    }
    *budget = budget.checked_sub(read).ok_or(too_large)?;

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| IcapError::Header(String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

async fn read_exact<R>(reader: &mut R, len: usize) -> Result<Bytes, IcapError>
where
    R: AsyncBufRead + Unpin,
{
    if len > MAX_BODY_BYTES {
        return Err(IcapError::TooLarge {
            what: "encapsulated section",
            limit: MAX_BODY_BYTES,
        });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => IcapError::UnexpectedEof,
        _ => IcapError::Io(e),
    })?;
    Ok(Bytes::from(buf))
}

/// An outgoing response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcapResponse {
    pub status: u16,
    pub headers: Headers,
    /// Encapsulated HTTP response head, including the blank line.
    pub http_head: Option<Bytes>,
    pub http_body: Bytes,
}

impl IcapResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            http_head: None,
            http_body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    /// Attach an HTTP response to be substituted for the original request.
    pub fn with_http(mut self, head: Bytes, body: Bytes) -> Self {
        self.http_head = Some(head);
        self.http_body = body;
        self
    }

    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::new();
        out.extend_from_slice(format!("{ICAP_VERSION} {} {}\r\n", self.status, reason(self.status)).as_bytes());
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }

        let encapsulated = match &self.http_head {
            None => "null-body=0".to_string(),
            Some(head) if self.http_body.is_empty() => format!("res-hdr=0, null-body={}", head.len()),
            Some(head) => format!("res-hdr=0, res-body={}", head.len()),
        };
        out.extend_from_slice(format!("Encapsulated: {encapsulated}\r\n\r\n").as_bytes());

        if let Some(head) = &self.http_head {
            out.extend_from_slice(head);
            if !self.http_body.is_empty() {
                out.extend_from_slice(format!("{:x}\r\n", self.http_body.len()).as_bytes());
                out.extend_from_slice(&self.http_body);
                out.extend_from_slice(b"\r\n0\r\n\r\n");
            }
        }
        out
    }
}

pub fn reason(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "ICAP Service Not Found",
        405 => "Method Not Allowed",
        500 => "Server Error",
        _ => "Unknown",
    }
}

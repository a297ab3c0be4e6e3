//! Conversion between encapsulated HTTP bytes and axum types.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, Response},
};
use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;

use crate::icap::codec::IcapError;

/// Hop-by-hop framing headers that no longer describe the de-chunked body.
const FRAMING_HEADERS: [&str; 2] = ["content-length", "transfer-encoding"];

fn http_error(message: impl Into<String>) -> IcapError {
    IcapError::Http(message.into())
}

/// Request line and headers of an encapsulated HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequestHead {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequestHead {
    pub fn parse(raw: &[u8]) -> Result<Self, IcapError> {
        let text = std::str::from_utf8(raw).map_err(|_| http_error("request head must be valid UTF-8"))?;
        let mut lines = text.split("\r\n").flat_map(|l| l.split('\n'));

        let request_line = lines.next().ok_or_else(|| http_error("missing request line"))?;
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
            return Err(http_error(format!("invalid request line {request_line:?}")));
        };

        let mut headers = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| http_error(format!("invalid header {line:?}")))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            headers,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Build an axum request carrying `body`.
    pub fn into_request(self, body: Bytes) -> Result<Request<Body>, IcapError> {
        let method = Method::from_bytes(self.method.as_bytes()).map_err(|e| http_error(e.to_string()))?;
        let mut builder = Request::builder().method(method).uri(self.target.as_str());

        for (name, value) in &self.headers {
            if FRAMING_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| http_error(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| http_error(e.to_string()))?;
            builder = builder.header(name, value);
        }

        builder.body(Body::from(body)).map_err(|e| http_error(e.to_string()))
    }
}

/// Serialize a response into an HTTP/1.1 head and a collected body.
pub async fn encode_response(response: Response<Body>) -> Result<(Bytes, Bytes), IcapError> {
    let (parts, body) = response.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| http_error(format!("failed collecting response body: {e}")))?
        .to_bytes();

    let mut head = BytesMut::new();
    let reason = parts.status.canonical_reason().unwrap_or("");
    head.extend_from_slice(format!("HTTP/1.1 {} {reason}\r\n", parts.status.as_u16()).as_bytes());
    for (name, value) in &parts.headers {
        if FRAMING_HEADERS.contains(&name.as_str()) {
            continue;
        }
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(format!("content-length: {}\r\n\r\n", body.len()).as_bytes());

    Ok((head.freeze(), body))
}

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};

/// Lazily produced sequence of newline-terminated JSON documents
///
/// An `Err` item ends the stream early.
pub type DocumentStream = Box<dyn Iterator<Item = serde_json::Result<Bytes>> + Send>;

/// Response payload
pub enum Body {
    Empty,
    Full(Bytes),
    /// Written as one chunk per document, each flushed before the next is produced
    Documents(DocumentStream),
}

impl Body {
    /// Length known up front, `None` for streamed bodies
    pub fn len(&self) -> Option<usize> {
        match self {
            Body::Empty => Some(0),
            Body::Full(bytes) => Some(bytes.len()),
            Body::Documents(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Body::Documents(_) => f.write_str("Documents(..)"),
        }
    }
}

/// A response produced by a route handler
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    /// Response with the given status and no body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// Serializes `data` as a single JSON document
    ///
    /// Serialization failures turn into a 500 carrying the error text.
    pub fn json<T: Serialize>(status: StatusCode, data: &T) -> Self {
        match encode_json_line(data) {
            Ok(body) => Self::new(status)
                .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .with_body(body),
            Err(e) => Self::error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        }
    }

    /// Plain-text error response, body terminated by a newline
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::new(status)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )
            .with_header(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            )
            .with_body(format!("{message}\n"))
    }

    /// Error response whose body is the canonical reason phrase
    pub fn reason(status: StatusCode) -> Self {
        Self::error(status, status.canonical_reason().unwrap_or("Unknown Status"))
    }

    /// 200 response streaming `documents` as `application/json`
    pub fn documents(documents: DocumentStream) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Body::Documents(documents),
        }
        .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::Full(body.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Body) {
        (self.status, self.headers, self.body)
    }

    /// Gzip-encodes a full body and labels it with `Content-Encoding`
    ///
    /// Empty and streamed bodies pass through untouched.
    pub fn gzip(mut self) -> io::Result<Self> {
        if let Body::Full(bytes) = &self.body {
            let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
            encoder.write_all(bytes)?;
            self.body = Body::Full(Bytes::from(encoder.finish()?));
            self.headers
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }
        Ok(self)
    }
}

/// Encodes `data` as compact JSON followed by a newline
pub fn encode_json_line<T: Serialize>(data: &T) -> serde_json::Result<Bytes> {
    let mut buf = serde_json::to_vec(data)?;
    buf.push(b'\n');
    Ok(Bytes::from(buf))
}

use crate::security::{RequestLimits, SizeError};

use bytes::{Buf, Bytes, BytesMut};
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use std::fmt::Write as _;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// HTTP/1.x framing for the inspection server
///
/// Decodes request heads with `httparse` followed by a `Content-Length`
/// delimited body, and encodes response heads, fixed-length data and
/// chunked transfer-coding.
pub struct HttpCodec {
    limits: RequestLimits,
    state: DecodeState,
}

#[derive(Debug, thiserror::Error)]
pub enum HttpProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP parsing error: {0}")]
    HttpParse(String),
    #[error("Request head exceeds {limit} bytes or too many header fields")]
    HeadTooLarge { limit: usize },
    #[error(transparent)]
    BodyTooLarge(#[from] SizeError),
    #[error("Unsupported transfer encoding: {0}")]
    UnsupportedTransferEncoding(String),
    #[error("Incomplete request")]
    IncompleteRequest,
}

impl HttpProtocolError {
    /// Status to answer with before closing, `None` when the peer is gone
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpProtocolError::HttpParse(_) => Some(StatusCode::BAD_REQUEST),
            HttpProtocolError::HeadTooLarge { .. } => {
                Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
            }
            HttpProtocolError::BodyTooLarge(_) => Some(StatusCode::PAYLOAD_TOO_LARGE),
            HttpProtocolError::UnsupportedTransferEncoding(_) => Some(StatusCode::NOT_IMPLEMENTED),
            HttpProtocolError::Io(_) | HttpProtocolError::IncompleteRequest => None,
        }
    }
}

/// Parsed request line and headers
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

/// A complete request as produced by the decoder
#[derive(Debug, Clone)]
pub struct DecodedRequest {
    pub head: RequestHead,
    pub body: Bytes,
}

/// Status line and headers of a response
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Unit written to the connection
#[derive(Debug, Clone)]
pub enum Frame {
    Head(ResponseHead),
    /// Raw body bytes of a fixed-length response
    Data(Bytes),
    /// One chunk of a chunked response; empty chunks are skipped
    Chunk(Bytes),
    /// Terminating zero-length chunk
    EndOfChunks,
}

enum DecodeState {
    Head,
    Body { head: RequestHead, length: usize },
}

impl HttpCodec {
    pub fn new(limits: RequestLimits) -> Self {
        Self {
            limits,
            state: DecodeState::Head,
        }
    }

    fn decode_head(
        &self,
        src: &mut BytesMut,
    ) -> Result<Option<(RequestHead, usize)>, HttpProtocolError> {
        // Stray CRLFs between pipelined requests are ignored
        while src.starts_with(b"\r\n") {
            src.advance(2);
        }
        if src.is_empty() {
            return Ok(None);
        }

        let head_limit = self.limits.head_validator();
        let too_large = HttpProtocolError::HeadTooLarge {
            limit: head_limit.max_size(),
        };

        let mut headers = vec![httparse::EMPTY_HEADER; self.limits.max_headers];
        let mut req = httparse::Request::new(&mut headers);

        let parsed_len = match req.parse(&src[..]) {
            Ok(httparse::Status::Complete(parsed_len)) => parsed_len,
            Ok(httparse::Status::Partial) => {
                return match head_limit.validate_size(src.len()) {
                    Ok(()) => Ok(None),
                    Err(_) => Err(too_large),
                };
            }
            Err(httparse::Error::TooManyHeaders) => return Err(too_large),
            Err(e) => {
                return Err(HttpProtocolError::HttpParse(format!(
                    "Failed to parse request head: {e}"
                )));
            }
        };
        if head_limit.validate_size(parsed_len).is_err() {
            return Err(too_large);
        }

        let method = Method::from_bytes(req.method.unwrap_or_default().as_bytes())
            .map_err(|e| HttpProtocolError::HttpParse(format!("Invalid method: {e}")))?;
        let target = req.path.unwrap_or_default();
        let uri = target
            .parse::<Uri>()
            .map_err(|e| HttpProtocolError::HttpParse(format!("Invalid request target {target:?}: {e}")))?;
        let version = match req.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            other => {
                return Err(HttpProtocolError::HttpParse(format!(
                    "Unsupported HTTP version: {other:?}"
                )));
            }
        };

        let mut header_map = HeaderMap::with_capacity(req.headers.len());
        for h in req.headers.iter() {
            let name = HeaderName::from_bytes(h.name.as_bytes())
                .map_err(|e| HttpProtocolError::HttpParse(format!("Invalid header name: {e}")))?;
            let value = HeaderValue::from_bytes(h.value)
                .map_err(|e| HttpProtocolError::HttpParse(format!("Invalid header value: {e}")))?;
            header_map.append(name, value);
        }

        if let Some(te) = header_map.get(header::TRANSFER_ENCODING) {
            return Err(HttpProtocolError::UnsupportedTransferEncoding(
                String::from_utf8_lossy(te.as_bytes()).into_owned(),
            ));
        }

        let length = content_length(&header_map)?;
        self.limits.body_validator().validate_size(length)?;

        src.advance(parsed_len);

        Ok(Some((
            RequestHead {
                method,
                uri,
                version,
                headers: header_map,
            },
            length,
        )))
    }
}

/// Declared body length; repeated headers must agree
fn content_length(headers: &HeaderMap) -> Result<usize, HttpProtocolError> {
    let mut length = None;
    for value in headers.get_all(header::CONTENT_LENGTH) {
        let parsed = value
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|v| v.parse::<usize>().ok())
            .ok_or_else(|| HttpProtocolError::HttpParse("Invalid Content-Length".to_string()))?;

        match length {
            Some(previous) if previous != parsed => {
                return Err(HttpProtocolError::HttpParse(
                    "Conflicting Content-Length values".to_string(),
                ));
            }
            _ => length = Some(parsed),
        }
    }
    Ok(length.unwrap_or(0))
}

impl Decoder for HttpCodec {
    type Item = DecodedRequest;
    type Error = HttpProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match std::mem::replace(&mut self.state, DecodeState::Head) {
                DecodeState::Head => match self.decode_head(src)? {
                    Some((head, length)) => self.state = DecodeState::Body { head, length },
                    None => return Ok(None),
                },
                DecodeState::Body { head, length } => {
                    if src.len() < length {
                        src.reserve(length - src.len());
                        self.state = DecodeState::Body { head, length };
                        return Ok(None);
                    }
                    let body = src.split_to(length).freeze();
                    return Ok(Some(DecodedRequest { head, body }));
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(request) => Ok(Some(request)),
            None if buf.is_empty() && matches!(self.state, DecodeState::Head) => Ok(None),
            None => Err(HttpProtocolError::IncompleteRequest),
        }
    }
}

impl Encoder<Frame> for HttpCodec {
    type Error = HttpProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match frame {
            Frame::Head(head) => encode_head(&head, dst),
            Frame::Data(bytes) => dst.extend_from_slice(&bytes),
            Frame::Chunk(bytes) => {
                if !bytes.is_empty() {
                    let _ = write!(dst, "{:x}\r\n", bytes.len());
                    dst.extend_from_slice(&bytes);
                    dst.extend_from_slice(b"\r\n");
                }
            }
            Frame::EndOfChunks => dst.extend_from_slice(b"0\r\n\r\n"),
        }
        Ok(())
    }
}

fn encode_head(head: &ResponseHead, dst: &mut BytesMut) {
    let _ = write!(
        dst,
        "HTTP/1.1 {} {}\r\n",
        head.status.as_str(),
        head.status.canonical_reason().unwrap_or("")
    );
    for (name, value) in head.headers.iter() {
        dst.extend_from_slice(name.as_str().as_bytes());
        dst.extend_from_slice(b": ");
        dst.extend_from_slice(value.as_bytes());
        dst.extend_from_slice(b"\r\n");
    }
    dst.extend_from_slice(b"\r\n");
}

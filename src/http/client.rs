use crate::{DumpError, Result};
use bytes::{Buf, Bytes, BytesMut};
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Configuration for [`DumpClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Read timeout for each socket read
    pub read_timeout: Duration,
    /// Write timeout for sending a request
    pub write_timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum response body size to prevent memory exhaustion
    pub max_response_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_response_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// A fully read response
#[derive(Debug, Clone)]
pub struct ClientResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    chunks: Vec<Bytes>,
    interim: Vec<StatusCode>,
}

impl ClientResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whole body, chunks concatenated
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Individual chunks of a chunked response, empty otherwise
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// Informational statuses received ahead of this response
    pub fn interim(&self) -> &[StatusCode] {
        &self.interim
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| DumpError::Protocol(format!("Invalid JSON body: {e}")))
    }
}

/// Minimal HTTP/1.1 client for exercising the inspection server
///
/// Keeps its connection open between requests unless the server closes it.
///
/// ```no_run
/// use httpdump::DumpClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut client = DumpClient::connect("127.0.0.1:8090".parse()?).await?;
///     let response = client.get("/user-agent").await?;
///     println!("{}", response.text());
///     Ok(())
/// }
/// ```
pub struct DumpClient {
    stream: TcpStream,
    addr: SocketAddr,
    buf: BytesMut,
    config: ClientConfig,
}

impl DumpClient {
    /// Connect with default configuration
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_config(addr, ClientConfig::default()).await
    }

    /// Connect to a server with custom configuration
    pub async fn connect_with_config(addr: SocketAddr, config: ClientConfig) -> Result<Self> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| DumpError::Timeout("Connection timeout".to_string()))??;

        Ok(Self {
            stream,
            addr,
            buf: BytesMut::with_capacity(8192),
            config,
        })
    }

    pub async fn get(&mut self, target: &str) -> Result<ClientResponse> {
        self.request(Method::GET, target, &[], &[]).await
    }

    /// Sends a request and reads the complete response
    ///
    /// A `Host` header is added unless `headers` already has one.
    pub async fn request(
        &mut self,
        method: Method,
        target: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<ClientResponse> {
        let mut raw = format!("{method} {target} HTTP/1.1\r\n");
        if !headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("host")) {
            raw.push_str(&format!("Host: {}\r\n", self.addr));
        }
        for (name, value) in headers {
            raw.push_str(&format!("{name}: {value}\r\n"));
        }
        if !body.is_empty() {
            raw.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        raw.push_str("\r\n");

        let mut bytes = raw.into_bytes();
        bytes.extend_from_slice(body);
        self.write_raw(&bytes).await?;
        self.read_response(method == Method::HEAD).await
    }

    /// Sends pre-framed request bytes and reads one response
    pub async fn send_raw(&mut self, raw: &[u8]) -> Result<ClientResponse> {
        self.write_raw(raw).await?;
        self.read_response(false).await
    }

    /// Writes bytes to the connection without reading anything back
    pub async fn write_raw(&mut self, raw: &[u8]) -> Result<()> {
        timeout(self.config.write_timeout, async {
            self.stream.write_all(raw).await?;
            self.stream.flush().await
        })
        .await
        .map_err(|_| DumpError::Timeout("Write timeout".to_string()))??;
        Ok(())
    }

    /// Reads the next final response; `head_request` means no body follows
    ///
    /// Interim 1xx heads other than 101 are collected and skipped.
    pub async fn read_response(&mut self, head_request: bool) -> Result<ClientResponse> {
        let mut interim = Vec::new();
        let (status, headers) = loop {
            let (status, headers) = self.read_head().await?;
            if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
                interim.push(status);
                continue;
            }
            break (status, headers);
        };

        let bodyless = head_request
            || status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED;
        let chunked = headers
            .get(header::TRANSFER_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("chunked"));
        let content_length = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok());

        let (body, chunks) = if bodyless {
            (Bytes::new(), Vec::new())
        } else if chunked {
            let chunks = self.read_chunked().await?;
            (Bytes::from(chunks.concat()), chunks)
        } else if let Some(length) = content_length {
            self.check_size(length)?;
            self.fill_to(length).await?;
            (self.buf.split_to(length).freeze(), Vec::new())
        } else {
            (self.read_to_end().await?, Vec::new())
        };

        Ok(ClientResponse {
            status,
            headers,
            body,
            chunks,
            interim,
        })
    }

    async fn read_head(&mut self) -> Result<(StatusCode, HeaderMap)> {
        loop {
            let mut raw_headers = [httparse::EMPTY_HEADER; 64];
            let mut response = httparse::Response::new(&mut raw_headers);
            match response.parse(&self.buf) {
                Ok(httparse::Status::Complete(head_len)) => {
                    let status = response
                        .code
                        .and_then(|code| StatusCode::from_u16(code).ok())
                        .ok_or_else(|| DumpError::Protocol("Invalid status code".to_string()))?;
                    let mut headers = HeaderMap::with_capacity(response.headers.len());
                    for h in response.headers.iter() {
                        let name = HeaderName::from_bytes(h.name.as_bytes())
                            .map_err(|e| DumpError::Protocol(format!("Invalid header name: {e}")))?;
                        let value = HeaderValue::from_bytes(h.value)
                            .map_err(|e| DumpError::Protocol(format!("Invalid header value: {e}")))?;
                        headers.append(name, value);
                    }
                    self.buf.advance(head_len);
                    return Ok((status, headers));
                }
                Ok(httparse::Status::Partial) => {}
                Err(e) => {
                    return Err(DumpError::Protocol(format!(
                        "Failed to parse response head: {e}"
                    )));
                }
            }
            self.fill_required().await?;
        }
    }

    async fn read_chunked(&mut self) -> Result<Vec<Bytes>> {
        let mut chunks = Vec::new();
        let mut total = 0;

        loop {
            let line_end = self.read_line_end().await?;
            let size_line = std::str::from_utf8(&self.buf[..line_end])
                .map_err(|_| DumpError::Protocol("Invalid chunk size line".to_string()))?;
            let size_hex = size_line.split(';').next().unwrap_or("").trim();
            let size = usize::from_str_radix(size_hex, 16)
                .map_err(|_| DumpError::Protocol(format!("Invalid chunk size {size_hex:?}")))?;
            self.buf.advance(line_end + 2);

            if size == 0 {
                // Skip trailers up to the blank line
                loop {
                    let line_end = self.read_line_end().await?;
                    self.buf.advance(line_end + 2);
                    if line_end == 0 {
                        return Ok(chunks);
                    }
                }
            }

            total += size;
            self.check_size(total)?;
            self.fill_to(size + 2).await?;
            chunks.push(self.buf.split_to(size).freeze());
            self.buf.advance(2);
        }
    }

    async fn read_line_end(&mut self) -> Result<usize> {
        loop {
            if let Some(pos) = self.buf.windows(2).position(|w| w == b"\r\n") {
                return Ok(pos);
            }
            self.fill_required().await?;
        }
    }

    async fn read_to_end(&mut self) -> Result<Bytes> {
        while self.fill().await? > 0 {
            self.check_size(self.buf.len())?;
        }
        Ok(self.buf.split().freeze())
    }

    async fn fill_to(&mut self, len: usize) -> Result<()> {
        while self.buf.len() < len {
            self.fill_required().await?;
        }
        Ok(())
    }

    async fn fill_required(&mut self) -> Result<()> {
        if self.fill().await? == 0 {
            return Err(DumpError::Protocol(
                "Connection closed before the response was complete".to_string(),
            ));
        }
        Ok(())
    }

    async fn fill(&mut self) -> Result<usize> {
        self.buf.reserve(4096);
        let n = timeout(self.config.read_timeout, self.stream.read_buf(&mut self.buf))
            .await
            .map_err(|_| DumpError::Timeout("Read timeout".to_string()))??;
        Ok(n)
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.config.max_response_size {
            return Err(DumpError::Config(format!(
                "Response too large: {} bytes, max allowed: {}",
                size, self.config.max_response_size
            )));
        }
        Ok(())
    }
}

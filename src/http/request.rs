use super::protocol::DecodedRequest;
use crate::{DumpError, Result};
use bytes::Bytes;
use http::header::{self, AsHeaderName};
use http::{HeaderMap, Method, Uri, Version};

/// An inbound request as seen by the route handlers
///
/// Built by the connection from a decoded request head plus body, or by
/// hand through [`Request::new`] when exercising handlers directly.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: String,
    secure: bool,
}

impl Request {
    /// Creates an HTTP/1.1 request for `target` received from `remote_addr`
    ///
    /// ```
    /// use httpdump::Request;
    /// use http::{HeaderMap, Method};
    ///
    /// let request = Request::new(Method::GET, "/get?a=1", HeaderMap::new(), "10.0.0.5:54321").unwrap();
    /// assert_eq!(request.path(), "/get");
    /// assert_eq!(request.query(), Some("a=1"));
    /// ```
    pub fn new(
        method: Method,
        target: &str,
        headers: HeaderMap,
        remote_addr: impl Into<String>,
    ) -> Result<Self> {
        let uri = target
            .parse::<Uri>()
            .map_err(|e| DumpError::InvalidRequest(format!("invalid request target {target:?}: {e}")))?;

        Ok(Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers,
            body: Bytes::new(),
            remote_addr: remote_addr.into(),
            secure: false,
        })
    }

    pub(crate) fn from_decoded(decoded: DecodedRequest, remote_addr: String, secure: bool) -> Self {
        let DecodedRequest { head, body } = decoded;
        Self {
            method: head.method,
            uri: head.uri,
            version: head.version,
            headers: head.headers,
            body,
            remote_addr,
            secure,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Marks the request as received over an encrypted connection
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Connection-level peer address, `ip:port`
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Path plus query exactly as the client sent them
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.uri.path())
    }

    /// Host the request was addressed to
    ///
    /// An absolute-form target wins over the `Host` header.
    pub fn host(&self) -> &str {
        if let Some(authority) = self.uri.authority() {
            return authority.as_str();
        }
        self.header_str(header::HOST).unwrap_or("")
    }

    /// First value of a header, if present and visible ASCII
    pub fn header_str<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether the connection may be reused after this request
    pub fn keep_alive(&self) -> bool {
        let mut close = false;
        let mut keep_alive = false;

        let tokens = self
            .headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim);
        for token in tokens {
            if token.eq_ignore_ascii_case("close") {
                close = true;
            } else if token.eq_ignore_ascii_case("keep-alive") {
                keep_alive = true;
            }
        }

        if close {
            return false;
        }
        match self.version {
            Version::HTTP_10 | Version::HTTP_09 => keep_alive,
            _ => true,
        }
    }
}

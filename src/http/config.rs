use crate::dump::OriginPolicy;
use crate::security::RequestLimits;
use std::net::SocketAddr;
use std::time::Duration;

/// Default listen address of the inspection server
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8090";

/// Configuration for the HTTP inspection server
///
/// # Examples
///
/// ```rust
/// use httpdump::http::HttpConfig;
/// use httpdump::OriginPolicy;
/// use std::time::Duration;
///
/// let config = HttpConfig {
///     bind_addr: "127.0.0.1:8090".parse().unwrap(),
///     max_connections: 100,
///     read_timeout: Duration::from_secs(30),
///     origin_policy: OriginPolicy::Merged,
///     ..Default::default()
/// };
/// assert!(config.cors);
/// ```
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Network address to bind to
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Read buffer capacity reserved per connection
    pub buffer_size: usize,
    /// Idle timeout while waiting for the next request
    pub read_timeout: Duration,
    /// Upper bound for writing one complete response
    pub write_timeout: Duration,
    /// Server name to include in responses (optional)
    pub server_name: Option<String>,
    /// Request size limits
    pub limits: RequestLimits,
    /// How the caller's origin is reported
    pub origin_policy: OriginPolicy,
    /// Whether to answer cross-origin requests
    pub cors: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8090)),
            max_connections: 1000,
            buffer_size: 8192, // Larger buffer for HTTP requests
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            server_name: Some(format!("httpdump/{}", env!("CARGO_PKG_VERSION"))),
            limits: RequestLimits::default(),
            origin_policy: OriginPolicy::default(),
            cors: true,
        }
    }
}

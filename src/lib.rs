use crate::http::protocol::HttpProtocolError;
use std::net::SocketAddr;
use thiserror::Error;

/// Error types for the httpdump library
#[derive(Error, Debug)]
pub enum DumpError {
    /// TCP-related errors (accept, read, write)
    #[error("TCP error: {0}")]
    Tcp(#[from] std::io::Error),

    /// The listener could not be bound
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP framing errors (malformed request, size limits)
    #[error("HTTP protocol error: {0}")]
    Protocol(String),

    /// A request value could not be constructed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),
}

impl From<HttpProtocolError> for DumpError {
    fn from(err: HttpProtocolError) -> Self {
        match err {
            HttpProtocolError::Io(e) => DumpError::Tcp(e),
            other => DumpError::Protocol(other.to_string()),
        }
    }
}

/// Result type for the httpdump library
pub type Result<T> = std::result::Result<T, DumpError>;

pub mod common;
pub mod dump;
pub mod http;
pub mod security;

// Re-export main types for convenience
pub use crate::common::DumpServerTrait;
pub use crate::dump::{Exchange, Origin, OriginPolicy, RequestSnapshot, Router};
pub use crate::http::{DumpClient, HttpConfig, HttpDumpServer, Request, Response};

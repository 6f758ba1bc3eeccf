//! HTTP/1.x transport for the inspection server
//!
//! Requests are framed with `httparse` behind a tokio-util codec, handed to
//! the [`Router`](crate::dump::Router) and written back with either a fixed
//! length or chunked transfer-coding.

pub mod client;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod request;
pub mod response;
pub mod server;


pub use client::{ClientConfig, ClientResponse, DumpClient};
pub use config::HttpConfig;
pub use protocol::{HttpCodec, HttpProtocolError};
pub use request::Request;
pub use response::{Body, Response};
pub use server::HttpDumpServer;

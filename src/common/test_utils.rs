use crate::http::{HttpConfig, HttpDumpServer};
use crate::{DumpError, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Starts a server on an ephemeral loopback port for integration tests
///
/// The listener is bound before the server task is spawned, so the
/// returned address accepts connections immediately.
pub async fn spawn_test_server(
    config: HttpConfig,
) -> Result<(JoinHandle<Result<()>>, SocketAddr)> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| DumpError::Config(format!("Failed to bind listener: {e}")))?;
    let addr = listener
        .local_addr()
        .map_err(|e| DumpError::Config(format!("Failed to get local address: {e}")))?;

    let server = HttpDumpServer::new(HttpConfig {
        bind_addr: addr,
        ..config
    });

    let server_handle = tokio::spawn(async move { server.serve(listener).await });

    Ok((server_handle, addr))
}

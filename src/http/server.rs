use super::config::HttpConfig;
use super::connection::serve_connection;
use crate::common::DumpServerTrait;
use crate::dump::Router;
use crate::{DumpError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{Instrument, error, info, warn};

/// HTTP request inspection server
///
/// Accepts TCP connections and serves each one on its own task, routing
/// every request through a shared [`Router`].
///
/// # Examples
///
/// Server with graceful shutdown:
///
/// ```no_run
/// use httpdump::{DumpServerTrait, HttpConfig, HttpDumpServer};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = HttpDumpServer::new(HttpConfig::default());
///     let shutdown_signal = server.shutdown_signal();
///
///     let server_handle = tokio::spawn(async move { server.run().await });
///
///     // Do other work...
///
///     let _ = shutdown_signal.send(());
///     server_handle.await??;
///     Ok(())
/// }
/// ```
pub struct HttpDumpServer {
    config: Arc<HttpConfig>,
    router: Arc<Router>,
    shutdown_signal: Arc<tokio::sync::broadcast::Sender<()>>,
}

impl HttpDumpServer {
    /// Creates a server with the standard route table for `config`
    pub fn new(config: HttpConfig) -> Self {
        let router = Router::standard(config.origin_policy).with_cors(config.cors);
        Self::with_router(config, router)
    }

    /// Creates a server dispatching to a custom route table
    pub fn with_router(config: HttpConfig, router: Router) -> Self {
        let (shutdown_signal, _) = tokio::sync::broadcast::channel(1);
        Self {
            config: Arc::new(config),
            router: Arc::new(router),
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Binds the configured listen address
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|source| DumpError::Bind {
                addr: self.config.bind_addr,
                source,
            })
    }

    /// Serves connections from an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "HTTP dump server listening");

        let connection_count = Arc::new(AtomicUsize::new(0));
        let mut shutdown_rx = self.shutdown_signal.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let current_count = connection_count.load(Ordering::SeqCst);
                            if current_count >= self.config.max_connections {
                                warn!(%addr, current = current_count, limit = self.config.max_connections, "Connection rejected: limit reached");
                                continue;
                            }

                            let new_count = connection_count.fetch_add(1, Ordering::SeqCst) + 1;
                            info!(%addr, current = new_count, "Accepted connection");

                            let config = self.config.clone();
                            let router = self.router.clone();
                            let connection_count = connection_count.clone();
                            let span = tracing::info_span!("connection", %addr);

                            tokio::spawn(async move {
                                let result = serve_connection(stream, addr, &router, &config).instrument(span).await;
                                if let Err(e) = result {
                                    error!(%addr, error = %e, "Error handling connection");
                                }
                                let final_count = connection_count.fetch_sub(1, Ordering::SeqCst) - 1;
                                info!(%addr, current = final_count, "Connection closed");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping server");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received internal shutdown signal, stopping server");
                    break;
                }
            }
        }

        info!("HTTP dump server stopped");
        Ok(())
    }
}

#[async_trait]
impl DumpServerTrait for HttpDumpServer {
    async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }
}

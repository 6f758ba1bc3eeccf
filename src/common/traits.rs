use crate::Result;
use async_trait::async_trait;

/// Common trait for inspection servers
///
/// Implemented by servers that can be started and stopped from the
/// outside, so binaries and tests drive them the same way.
#[async_trait]
pub trait DumpServerTrait {
    /// Binds the configured address and serves connections until shutdown
    async fn run(&self) -> Result<()>;

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()>;
}

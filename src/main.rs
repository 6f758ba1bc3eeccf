use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use httpdump::http::config::DEFAULT_LISTEN;
use httpdump::{DumpServerTrait, HttpConfig, HttpDumpServer, OriginPolicy};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// HTTP request inspection server
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_LISTEN)]
    listen: SocketAddr,

    /// Maximum number of concurrent connections
    #[arg(long, default_value_t = 1000)]
    max_connections: usize,

    /// How the caller's address is reported by /ip and friends
    #[arg(long, value_enum, default_value_t = OriginPolicy::Structured)]
    origin_policy: OriginPolicy,

    /// Do not answer cross-origin requests
    #[arg(long)]
    no_cors: bool,

    /// Value of the Server response header
    #[arg(long)]
    server_name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("httpdump=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let defaults = HttpConfig::default();
    let config = HttpConfig {
        bind_addr: cli.listen,
        max_connections: cli.max_connections,
        origin_policy: cli.origin_policy,
        cors: !cli.no_cors,
        server_name: cli.server_name.or(defaults.server_name.clone()),
        ..defaults
    };

    info!(
        address = %config.bind_addr,
        max_connections = config.max_connections,
        origin_policy = ?config.origin_policy,
        cors = config.cors,
        "Starting HTTP dump server"
    );

    let server = HttpDumpServer::new(config);
    server.run().await.wrap_err("Failed to run HTTP dump server")?;

    Ok(())
}

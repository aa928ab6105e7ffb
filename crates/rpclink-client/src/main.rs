//! rpclink-client command-line entry point.
//!
//! Loads the config file, applies command-line overrides, then runs a client
//! until Ctrl-C.  Every lifecycle event is logged; inbound messages are
//! logged at debug level by the default sink.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()              -- TOML file, defaults when absent
//!  └─ ClientBuilder::connect()   -- spawns the driver task
//!       ├─ UdpBroadcast          -- discovery requests/responses
//!       └─ TcpJsonConnector      -- one link per selected server
//!  └─ ctrl_c() -> close()
//! ```
//!
//! # Settings precedence
//!
//! Command-line flag, then `RPCLINK_*` environment variable, then the config
//! file, then the built-in default.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rpclink_client::infrastructure::broadcast::UdpBroadcast;
use rpclink_client::infrastructure::storage::config::{default_config_path, load_config};
use rpclink_client::infrastructure::transport::TcpJsonConnector;
use rpclink_client::{ClientBuilder, ClientSettings, FixedRetry};

#[derive(Debug, Parser)]
#[command(name = "rpclink-client", version, about = "Find an rpclink server by service name and stay connected")]
struct Cli {
    /// Config file (defaults to the platform config directory).
    #[arg(long, env = "RPCLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Service name to discover.
    #[arg(long, env = "RPCLINK_SERVICE")]
    service: Option<String>,

    /// Address prefix passed to the transport.
    #[arg(long, env = "RPCLINK_PREFIX")]
    prefix: Option<String>,

    /// UDP port discovery requests are broadcast to.
    #[arg(long, env = "RPCLINK_DISCOVERY_PORT")]
    discovery_port: Option<u16>,

    /// Re-broadcast interval and reconnect backoff in milliseconds.
    #[arg(long, env = "RPCLINK_RETRY_MS")]
    retry_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(default_config_path);
    let mut config = match &config_path {
        Some(path) => load_config(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Default::default(),
    };
    if let Some(service) = cli.service {
        config.client.service_name = service;
    }
    if let Some(prefix) = cli.prefix {
        config.client.address_prefix = prefix;
    }
    if let Some(port) = cli.discovery_port {
        config.network.discovery_port = port;
    }
    if let Some(ms) = cli.retry_ms {
        config.network.retry_delay_ms = ms;
    }

    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.client.log_level)),
        )
        .init();

    info!("rpclink client starting");
    if config_path.is_none() {
        warn!("no config directory found; using built-in defaults");
    }

    let broadcast_ip = config.network.broadcast_ip()?;
    let settings = ClientSettings::new(
        config.client.address_prefix.clone(),
        config.network.discovery_port,
        config.client.service_name.clone(),
    );

    let client = ClientBuilder::new(settings)
        .retry_policy(FixedRetry::new(config.network.retry_delay()))
        .on_connection(|ctx| info!(attempt = %ctx.attempt_id, "connected to {}", ctx.remote))
        .on_closed(|ctx| warn!(attempt = %ctx.attempt_id, "link to {} closed", ctx.remote))
        .on_error(|e, ctx| match ctx {
            Some(ctx) => error!(remote = %ctx.remote, "{e}"),
            None => error!("{e}"),
        })
        .on_close(|| info!("client closed"))
        .connect(
            Arc::new(UdpBroadcast::new(broadcast_ip)),
            Arc::new(TcpJsonConnector),
        )
        .context("starting client")?;

    info!(
        "searching for `{}` on UDP port {}",
        config.client.service_name, config.network.discovery_port
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("shutdown signal received");
    client.close().await;

    Ok(())
}

//! Authenticating API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────────┐
//!                          │                     API GATEWAY                       │
//!                          │                                                       │
//!     Client Request       │  ┌─────────┐    ┌──────────────┐    ┌─────────────┐  │
//!     ─────────────────────┼─▶│  http   │───▶│ route table  │───▶│    auth     │  │
//!                          │  │ server  │    │  (arc-swap)  │    │   filter    │  │
//!                          │  └─────────┘    └──────────────┘    └──────┬──────┘  │
//!                          │                                            │         │
//!                          │                                            ▼         │
//!                          │                                    ┌─────────────┐   │
//!                          │                                    │load_balancer│   │
//!                          │                                    │   + pool    │   │
//!                          │                                    └──────┬──────┘   │
//!                          │                                           ▼          │
//!     Client Response      │                                    ┌─────────────┐   │
//!     ◀────────────────────┼────────────────────────────────────│ dispatcher  │◀──┼── Backend
//!                          │                                    └─────────────┘   │
//!                          │                                                       │
//!                          │  config · health · observability · lifecycle          │
//!                          └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use api_gateway::config::{load_config, watcher::ConfigWatcher};
use api_gateway::lifecycle::{signals, Shutdown, StartupError};
use api_gateway::observability::{logging, metrics};
use api_gateway::{HttpServer, TokenValidator};

#[derive(Debug, Parser)]
#[command(name = "api-gateway", version, about = "Authenticating API gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "config/gateway.toml")]
    config: PathBuf,

    /// Reload routes when the configuration file changes.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).map_err(StartupError::from)?;
    logging::init(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "api-gateway starting"
    );

    let validator = TokenValidator::from_config(&config.auth).map_err(StartupError::from)?;
    tracing::info!(
        algorithm = ?validator.algorithm(),
        routes = config.routes.len(),
        backends = config.backends.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let server = HttpServer::new(config.clone(), validator)?;

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(StartupError::from)?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        signals::shutdown_signal().await;
        signal_shutdown.trigger();
    });

    // The watcher stops when its handle drops, so it lives until main returns.
    let (config_updates, _watcher) = if cli.watch {
        let (watcher, updates) = ConfigWatcher::new(&cli.config);
        (updates, Some(watcher.run()?))
    } else {
        let (_tx, updates) = mpsc::unbounded_channel();
        (updates, None)
    };

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

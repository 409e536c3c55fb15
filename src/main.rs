//! request-shield edge server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ trace / request id / panic / timeout
//!                          │
//!                          ▼
//!                  ┌───────────────┐   405 / 413 / 429 / 401
//!                  │ security gate │──────────────────────────▶ Client
//!                  └───────┬───────┘
//!                          ▼
//!                  ┌───────────────┐
//!                  │ body limit +  │
//!                  │ sanitizer     │
//!                  └───────┬───────┘
//!                          ▼
//!                       handler
//!                          │
//!                          ▼
//!                  ┌───────────────┐
//!     ◀────────────│ compression   │
//!     Response     └───────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use request_shield::config::{load_config, watcher::ConfigWatcher, ShieldConfig};
use request_shield::lifecycle::{spawn_signal_listener, Shutdown};
use request_shield::observability::{init_logging, init_metrics};
use request_shield::ShieldServer;

#[derive(Parser)]
#[command(name = "request-shield")]
#[command(
    about = "Rate limiting, request gating and response compression at the edge",
    long_about = None
)]
struct Args {
    /// TOML config file; defaults apply when omitted
    #[arg(short, long, env = "SHIELD_CONFIG")]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ShieldConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability)?;
    tracing::info!("request-shield v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        rate_limit = config.gate.rate_limit.max_requests,
        window_ms = config.gate.rate_limit.window_ms,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the lifetime of the server
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (Some(rx), Some(watcher.run()?))
        }
        None => (None, None),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    ShieldServer::new(config)
        .run(listener, config_updates, shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

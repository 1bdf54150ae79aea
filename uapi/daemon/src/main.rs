//! UAPI Daemon
//!
//! Serves a local control socket for a named instance. The daemon stops
//! when signalled or when the socket file is deleted out from under it.
//!
//! # Usage
//!
//! ```bash
//! # Listen on /var/run/uapi/wg0.sock
//! uapi-daemon wg0
//!
//! # Custom runtime directory and poll cadence
//! uapi-daemon wg0 --runtime-dir /tmp/uapi --poll-interval-ms 250
//!
//! # With verbose logging
//! RUST_LOG=debug uapi-daemon wg0
//! ```
//!
//! # Environment Variables
//!
//! - `UAPI_NAME`: Instance name (instead of the positional argument)
//! - `UAPI_RUNTIME_DIR`, `UAPI_SOCKET_SUFFIX`, `UAPI_POLL_INTERVAL_MS`,
//!   `UAPI_SOCKET_MODE`: Listener settings
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! Precedence: command line, then environment, then config file, then
//! defaults.
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: Graceful shutdown (closes and removes the socket)

mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info};

use uapi_core::ListenerConfig;

use crate::server::{DaemonServer, ServerConfig, StopReason};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "uapi-daemon", version, about = "Serve a local control socket")]
struct Args {
    /// Instance name; the socket is `<runtime-dir>/<name>.sock`
    #[arg(env = "UAPI_NAME")]
    name: String,

    /// TOML file with listener settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding socket files
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// How often to check that the socket file still exists
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Maximum number of concurrent connections
    #[arg(long, default_value_t = 100)]
    max_connections: usize,
}

impl Args {
    fn listener_config(&self) -> anyhow::Result<ListenerConfig> {
        let base = match &self.config {
            Some(path) => ListenerConfig::load_from_path(path)
                .with_context(|| format!("Failed to load config {path:?}"))?,
            None => ListenerConfig::default(),
        };

        let mut config = base.with_env_overrides();
        if let Some(dir) = &self.runtime_dir {
            config.runtime_dir.clone_from(dir);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        Ok(config)
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            max_connections: self.max_connections,
            ..Default::default()
        }
    }
}

/// Notify `shutdown` on Ctrl+C or SIGTERM
fn spawn_signal_handler(shutdown: Arc<Notify>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            () = ctrl_c => info!("Received Ctrl+C, shutting down"),
            () = terminate => info!("Received SIGTERM, shutting down"),
        }

        shutdown.notify_one();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("uapi_daemon=info".parse()?)
                .add_directive("uapi_core=info".parse()?),
        )
        .with_target(true)
        .init();

    let args = Args::parse();
    let config = args.listener_config()?;

    info!(name = %args.name, runtime_dir = ?config.runtime_dir, "Starting UAPI daemon");

    let shutdown = Arc::new(Notify::new());
    spawn_signal_handler(Arc::clone(&shutdown));

    let server_config = args.server_config();
    let server = DaemonServer::new(args.name, config).with_server_config(server_config);
    match server.run(shutdown).await? {
        StopReason::Shutdown => info!("UAPI daemon stopped cleanly"),
        StopReason::SocketDeleted => info!("UAPI daemon stopped: control socket removed"),
        StopReason::ListenerFailed(e) => {
            return Err(anyhow::Error::new(e).context("Control socket listener failed"));
        }
    }

    Ok(())
}

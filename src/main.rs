//! pluggable-server
//!
//! Runs one server described by a manifest under the lifecycle manager.
//!
//! ```text
//!   --manifest ──▶ FileResolver ──▶ ServerLifecycleManager ──▶ HttpComposer
//!                                          │                      │
//!   --config ──▶ ManagerOptions ───────────┘            plugins (health, ...)
//!                                          │
//!   SIGINT/SIGTERM ──▶ terminate ──▶ exit(0)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use pluggable_server::config::loader::load_options;
use pluggable_server::config::{FileResolver, LogLevel, ManagerOptions};
use pluggable_server::lifecycle::signals::shutdown_signal;
use pluggable_server::observability::{logging, metrics};
use pluggable_server::{ManifestSource, ServerLifecycleManager};

#[derive(Parser, Debug)]
#[command(name = "pluggable-server", about = "Run a plugin-composed HTTP server", version)]
struct Cli {
    /// Manifest file (TOML or JSON).
    #[arg(short, long)]
    manifest: PathBuf,

    /// Manager options file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server name used in logs and metrics.
    #[arg(long)]
    name: Option<String>,

    /// Upper bound on connection draining during stop.
    #[arg(long)]
    stop_timeout_ms: Option<u64>,

    /// TRACE, DEBUG, INFO, WARN or ERROR.
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    metrics_address: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut options = match &cli.config {
        Some(path) => load_options(path)?.0,
        None => ManagerOptions::default(),
    };
    if let Some(name) = cli.name {
        options.name = name;
    }
    if let Some(timeout) = cli.stop_timeout_ms {
        options.stop_timeout_ms = timeout;
    }
    if let Some(level) = cli.log_level {
        options.log_level = level.to_string();
    }
    options.auto_start = false;

    let handle_signals = options.handle_signals;
    let manifest = cli.manifest.to_string_lossy().into_owned();
    let server = ServerLifecycleManager::builder(ManifestSource::Reference(manifest))
        .options(options)
        .resolver(FileResolver::new())
        .build()?;

    logging::init(server.log_level())?;

    if let Some(addr) = cli.metrics_address {
        metrics::install_exporter(addr)?;
    }

    server.start().await?;
    tracing::info!(server = %server.name(), listeners = ?server.local_addrs().await, "Ready");

    if handle_signals {
        // The manager terminates and exits on SIGINT/SIGTERM.
        std::future::pending::<()>().await;
    } else {
        shutdown_signal().await;
        server.terminate().await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

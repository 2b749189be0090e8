//! Relay server
//!
//! Loads configuration, opens the store, registers the demo services on an
//! in-process broker and runs until Ctrl+C.

mod demo;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use relay_service::{HostEvent, LocalBroker, RelayConfig, ServiceHost};

use logging::{LoggingConfig, init_logging};

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(name = "relay-server", version, about = "Declarative services over a message bus")]
struct Cli {
    /// Configuration file; defaults to conf/relay.yml when present
    #[arg(short = 'c', long = "config", env = "RELAY_CONFIG")]
    config: Option<PathBuf>,
    /// Directory for rolling log files; console only when absent
    #[arg(long = "log-dir")]
    log_dir: Option<PathBuf>,
    /// Override the database directory
    #[arg(long = "db-path")]
    db_path: Option<PathBuf>,
    /// Start without the demo services
    #[arg(long = "no-demo")]
    no_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _logging_guard = init_logging(&LoggingConfig::new(cli.log_dir.clone()))?;

    let mut config = RelayConfig::load(cli.config.as_deref())?;
    if let Some(db_path) = cli.db_path {
        config.db.path = db_path;
    }
    info!(
        servers = ?config.connection.servers,
        db_path = %config.db.path.display(),
        engine = ?config.db.engine,
        "configuration loaded"
    );

    let broker = LocalBroker::new();
    let host = ServiceHost::from_config(Arc::new(broker), &config)?;
    if !cli.no_demo {
        demo::register(&host)?;
    }

    tokio::spawn(log_host_events(host.subscribe_events()));
    host.connect().await?;
    info!(services = ?host.services(), "relay server started");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    host.close();
    Ok(())
}

async fn log_host_events(mut events: broadcast::Receiver<HostEvent>) {
    loop {
        match events.recv().await {
            Ok(HostEvent::Err(message)) => error!(error = %message, "broker error"),
            Ok(event) => info!(%event, "host event"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "host event observer lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

//! Process bootstrap: CLI, logging, link startup, session and server tasks.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};

use pivesc::config::Config;
use pivesc::server::{self, AppState};
use pivesc::transport::SerialLink;
use pivesc::{Dispatcher, Result, SessionManager, Transport, VescClient};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "pivesc", version, about = "VESC serial bridge")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long, env = "PIVESC_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device, overriding the configuration file
    #[arg(long, env = "PIVESC_PORT")]
    port: Option<String>,

    /// Listen address, overriding the configuration file
    #[arg(long)]
    listen: Option<std::net::SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_format);

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    // An absent device is not fatal: the session loop reports no-data until
    // the link comes back at the next restart.
    let link: Option<Box<dyn Transport>> = match SerialLink::open(&config.link()) {
        Ok(link) => {
            info!(port = %config.port, baud = config.baud_rate, "serial link open");
            Some(Box::new(link))
        }
        Err(err) => {
            warn!(error = %err, "running without a serial link");
            None
        }
    };

    let client = VescClient::new(Dispatcher::spawn(link));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (session, session_task) =
        SessionManager::spawn(client, config.poll_interval(), shutdown_rx);

    let state = Arc::new(AppState {
        session,
        config: config.clone(),
    });
    let server = server::spawn(config.listen, state).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    let _ = shutdown_tx.send(true);
    server.shutdown().await?;
    let _ = session_task.await;
    Ok(())
}

mod cli;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use btc_peer::net;

use crate::cli::Cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .init();

    info!("btc-peer v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.node_config();

    match net::connect(&config) {
        Ok(stage) => {
            info!(?stage, "disconnected");
            Ok(())
        }
        Err(err) => {
            error!(%err, "connection failed");
            Err(err.into())
        }
    }
}

//! Wasp-in-a-box host
//!
//! Loads `configuration.yaml` (or the path given as first argument), sets up
//! every configured wasp_in_a_box entry and drives the source entities from
//! stdin commands until EOF or Ctrl-C.

mod commands;
mod config;
mod host;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::commands::Command;
use crate::config::ServerConfig;
use crate::host::Host;

const DEFAULT_CONFIG_PATH: &str = "configuration.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = ServerConfig::load(&path)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logger.default))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting wasp-in-a-box with {}", path);

    let host = Host::new();
    host.register_sources(&config.entities);

    let results = host.load_entries(&config.entries).await?;
    let failed = results.iter().filter(|r| r.is_err()).count();
    for result in results.iter().filter_map(|r| r.as_ref().err()) {
        warn!("Entry setup failed: {}", result);
    }
    info!(
        "Loaded {} of {} entries",
        results.len() - failed,
        results.len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>().and_then(|command| command.execute(&host)) {
                    Ok(output) => println!("{}", output),
                    Err(e) => eprintln!("error: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down...");
    host.shutdown().await;

    Ok(())
}

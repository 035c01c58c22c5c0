//! edgeguardd — the EdgeGuard daemon.
//!
//! Runs on every edge node and assembles:
//! - Topology resolver (Kubernetes registry)
//! - Check engine (weighted probe plugins)
//! - Gossip sender and receiver (HMAC-signed verdict exchange)
//! - Vote engine (quorum decisions, node annotations and taints)
//! - Runtime log level endpoint
//!
//! # Usage
//!
//! ```text
//! edgeguardd run --node-name edge-1 --plugin tcp:port=10250,weight=1
//! edgeguardd check-config --config /etc/edgeguard/edgeguard.toml
//! ```

mod config;
mod logging;
mod node;

use clap::{Parser, Subcommand};

use crate::config::{DaemonConfig, Overrides};

#[derive(Parser)]
#[command(name = "edgeguardd", about = "EdgeGuard edge node failure detector")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the health checker on this node.
    Run(Overrides),

    /// Validate the configuration and print the effective values.
    CheckConfig(Overrides),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(overrides) => {
            let config = validated(&overrides)?;
            let log = logging::init(config.log.format, &config.log.filter)?;
            node::run(config, log).await
        }
        Command::CheckConfig(overrides) => {
            let config = validated(&overrides)?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn validated(overrides: &Overrides) -> anyhow::Result<DaemonConfig> {
    let config = DaemonConfig::resolve(overrides)?;
    if let Err(errors) = config.validate() {
        anyhow::bail!("invalid configuration:\n  - {}", errors.join("\n  - "));
    }
    Ok(config)
}

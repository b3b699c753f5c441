//! Session broker entry point.

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use session_broker::cli::{Cli, Command, run_list_command, run_probe_command, run_start_command};
use session_broker::config::BrokerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // stdout carries command output only
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("session_broker=info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut config = BrokerConfig::from_env()?;
    cli.apply_overrides(&mut config);
    tracing::debug!(?config, "Resolved configuration");

    match &cli.command {
        Command::Start {
            name,
            service_version,
            timeout,
            no_wait,
        } => {
            run_start_command(&config, name, service_version.as_deref(), *timeout, *no_wait).await
        }
        Command::List => run_list_command(&config),
        Command::Probe { url, timeout } => {
            run_probe_command(url, Duration::from_millis(*timeout)).await
        }
    }
}

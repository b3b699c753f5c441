//! CLI command handling.
//!
//! Provides subcommands for:
//! - Starting a session and holding it until Ctrl-C (`start`)
//! - Listing the service catalog (`list`)
//! - Probing an endpoint for readiness (`probe`)

mod list;
mod session;

pub use list::{format_catalog, run_list_command};
pub use session::{build_manager, run_probe_command, run_start_command};

use std::path::PathBuf;

use clap::{ColorChoice, Parser, Subcommand};
use url::Url;

use crate::config::BrokerConfig;

#[derive(Parser, Debug)]
#[command(name = "session-broker")]
#[command(about = "Start browser-automation backends on demand")]
#[command(
    long_about = "Starts containers or driver processes for a requested service and waits until they answer.\nExamples:\n  session-broker start chrome --version 90.0\n  session-broker list"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Service catalog path (`.json` or `.toml`)
    #[arg(short, long, global = true, env = "BROKER_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Host address for published container ports
    #[arg(long, global = true, env = "BROKER_HOST_IP")]
    pub host_ip: Option<String>,

    /// Do not connect to Docker (driver commands only)
    #[arg(long, global = true)]
    pub no_docker: bool,
}

impl Cli {
    /// Apply flag overrides on top of the environment configuration.
    pub fn apply_overrides(&self, config: &mut BrokerConfig) {
        if let Some(catalog) = &self.catalog {
            config.catalog_path = catalog.clone();
        }
        if let Some(host_ip) = &self.host_ip {
            config.host_ip = Some(host_ip.clone());
        }
        if self.no_docker {
            config.docker_enabled = false;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a session and hold it until Ctrl-C
    #[command(
        about = "Start a session",
        long_about = "Starts a backend for the service, prints its endpoint and stops it on Ctrl-C.\nExample: session-broker start chromedriver --version 90"
    )]
    Start {
        /// Service name
        name: String,

        /// Service version (defaults to the catalog default)
        #[arg(short = 'v', long = "version", value_name = "VERSION")]
        service_version: Option<String>,

        /// Readiness timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Print the endpoint without waiting for it to answer
        #[arg(long)]
        no_wait: bool,
    },

    /// List services in the catalog
    #[command(about = "List catalog services")]
    List,

    /// Wait for a URL to answer
    #[command(
        about = "Probe an endpoint",
        long_about = "Polls the URL until it answers or the timeout passes.\nExample: session-broker probe http://127.0.0.1:4444/ --timeout 5000"
    )]
    Probe {
        /// URL to probe
        url: Url,

        /// Timeout in milliseconds
        #[arg(short, long, default_value_t = 30_000)]
        timeout: u64,
    },
}

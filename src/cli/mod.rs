//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the proxy.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// RFID Proxy - keep an RFID reader connected and publish its inventory.
#[derive(Parser, Debug)]
#[command(name = "rfid-proxy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (defaults to ~/.rfid-proxy/config.toml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the proxy until interrupted.
    Serve,

    /// List the serial ports the OS reports.
    Ports,

    /// Connect once, print the tags in the field and exit.
    Inventory,

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Manage the systemd user service.
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write the default configuration file if it does not exist.
    Init,

    /// Print the effective configuration.
    Show,
}

#[derive(Subcommand, Debug)]
pub enum ServiceAction {
    /// Install, enable and start the service.
    Install,

    /// Stop, disable and remove the service.
    Uninstall,

    /// Show service status.
    Status,

    /// Show recent service logs.
    Logs {
        /// Number of log lines.
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
}

impl Cli {
    /// Default log level for the selected command.
    #[must_use]
    pub fn default_log_level(&self) -> u8 {
        match self.command {
            Commands::Serve => 1,
            _ => 0,
        }
    }
}

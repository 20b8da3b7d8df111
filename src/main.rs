//! RFID Proxy - keep an RFID reader connected and publish its tag inventory.
//!
//! The proxy holds a serial session to the reader, finds it again after
//! power cycles, unplugs and port renumbering, and answers "which tags are
//! in the field right now" over HTTP.
//!
//!   rfid-proxy serve               # Run the proxy until Ctrl-C
//!   rfid-proxy ports               # List serial ports
//!   rfid-proxy inventory           # One-shot read without the server
//!   rfid-proxy config init         # Write the default config file
//!   rfid-proxy service install     # Run as a systemd user service

mod application;
mod cli;
mod domain;
mod infrastructure;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{
    format_inventory, format_ports_table, format_status, Cadence, InventoryService, LinkSettings,
    ProxyStatus, ReaderLink,
};
use cli::{Cli, Commands, ConfigAction, ServiceAction};
use domain::{AppConfig, AppError, DriverKind, POWER_UNKNOWN};
use infrastructure::{
    ensure_config_exists, http, load_config, load_config_or_default, render_config, PortScanner,
    SimulatedReader, SystemPorts, SystemdService,
};

fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose.max(cli.default_log_level()));

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
fn run(cli: Cli) -> domain::Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve => cmd_serve(config_path),
        Commands::Ports => cmd_ports(),
        Commands::Inventory => cmd_inventory(config_path),
        Commands::Config { action } => cmd_config(&action, config_path),
        Commands::Service { action } => cmd_service(&action, config_path),
    }
}

/// Build the reader link for the configured driver.
///
/// The simulated driver doubles as its own port list. A hardware driver
/// pairs with [`SystemPorts`] so the link scans what the OS reports.
fn build_link(config: &AppConfig) -> ReaderLink {
    let settings = LinkSettings::from_config(&config.reader);

    match config.reader.driver {
        DriverKind::Simulated => {
            let reader =
                SimulatedReader::from_config(&config.simulator, &config.reader.logical_source);
            ReaderLink::new(settings, Box::new(reader.clone()), Box::new(reader))
        }
    }
}

/// Run the proxy until interrupted.
fn cmd_serve(config_path: Option<&Path>) -> domain::Result<()> {
    let config = load_config_or_default(config_path);

    tracing::info!(
        host = %config.service.host,
        port = config.service.port,
        serial_port = config.reader.serial_port.as_deref().unwrap_or("<scan>"),
        logical_source = %config.reader.logical_source,
        power_mw = config.reader.power_mw,
        "Configuration"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::io("Failed to start async runtime", e))?;

    runtime.block_on(async {
        let link = Arc::new(build_link(&config));
        let service = Arc::new(InventoryService::new(
            link,
            Cadence::from(&config.supervisor),
        ));

        service.start();

        let result = http::serve(
            Arc::clone(&service),
            &config.bind_addr(),
            &config.endpoint_path(),
            shutdown_signal(),
        )
        .await;

        service.stop().await;
        result
    })
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }

    tracing::info!("Finishing the application...");
}

/// List serial ports command.
fn cmd_ports() -> domain::Result<()> {
    let ports = SystemPorts
        .ports()
        .map_err(|e| AppError::driver("port enumeration", e))?;

    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    println!("{}", format_ports_table(&ports));
    println!();
    println!("Total: {} port(s)", ports.len());

    Ok(())
}

/// One-shot inventory command.
fn cmd_inventory(config_path: Option<&Path>) -> domain::Result<()> {
    let config = load_config(config_path)?;
    let link = build_link(&config);

    let result = link.connect().and_then(|()| link.inventory());
    let status = ProxyStatus {
        link: link.status(),
        responding: link.probe(),
        power_mw: link.power().map_or(POWER_UNKNOWN, i64::from),
    };
    link.shutdown();

    let inventory = result?;

    println!("{}", format_status(&status));
    println!();
    println!("{}", format_inventory(&inventory));

    Ok(())
}

/// Configuration file command.
fn cmd_config(action: &ConfigAction, config_path: Option<&Path>) -> domain::Result<()> {
    match action {
        ConfigAction::Init => {
            let (path, created) = ensure_config_exists(config_path)?;
            if created {
                println!("{} Created {}", "✓".green().bold(), path.display());
            } else {
                println!("Config already exists at {}", path.display());
            }
        }
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            println!("{}", render_config(&config)?);
        }
    }

    Ok(())
}

/// Systemd service command.
fn cmd_service(action: &ServiceAction, config_path: Option<&Path>) -> domain::Result<()> {
    let (path, _) = ensure_config_exists(config_path)?;
    let path = path
        .canonicalize()
        .map_err(|e| AppError::io(format!("Failed to resolve {}", path.display()), e))?;
    let service = SystemdService::new(path);

    match action {
        ServiceAction::Install => {
            let result = service.install()?;
            println!(
                "{} Installed {}",
                "✓".green().bold(),
                result.service_path.display()
            );
            println!();
            println!("{}", result.unit_content.trim_end().dimmed());
        }
        ServiceAction::Uninstall => {
            service.uninstall()?;
            println!("{} Service removed", "✓".green().bold());
        }
        ServiceAction::Status => {
            let status = service.get_status()?;
            println!("{} {}", "Service:".bold(), status.short_status());
            if status.is_installed {
                println!();
                println!("{}", status.status_text);
            }
        }
        ServiceAction::Logs { lines } => {
            println!("{}", service.view_logs(*lines)?);
        }
    }

    Ok(())
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

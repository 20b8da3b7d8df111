//! Configuration file management.
//!
//! Handles loading and writing the TOML configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AppConfig, AppError, Result};

/// Default configuration file content.
const DEFAULT_CONFIG: &str = r#"# RFID Proxy Configuration
# Auto-generated - edit as needed

[service]
# Interface and port the HTTP endpoint binds to
host = "127.0.0.1"
port = 8888

# Path prefix of the endpoint
path = "/rfid-proxy"

[reader]
# Preferred serial port; all serial ports are scanned if it does not answer
# serial_port = "/dev/ttyACM0"

# Logical source (antenna group) to read tags from
logical_source = "Source_0"

# RF power in mW (0-199)
power_mw = 199

# Driver backing the reader session
driver = "simulated"

# Upper bound for any single reader call, in milliseconds
call_timeout_ms = 3000

[supervisor]
# Pause between liveness probes while connected
probe_interval_ms = 2000

# Pause between connect attempts while the reader is gone
retry_interval_ms = 1000

[simulator]
ports = ["/dev/ttyACM0"]
reader_port = "/dev/ttyACM0"
firmware = "SIM-1.0.0"
tags = ["E2003412", "001ABF"]
"#;

/// Load configuration from `path`, or the default location.
///
/// A missing file yields defaults. Out-of-range values are replaced by
/// defaults with a warning.
///
/// # Errors
/// Returns error if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config_path = path.map_or_else(AppConfig::default_config_path, Path::to_path_buf);

    let mut config = if config_path.exists() {
        load_config_from_file(&config_path)?
    } else {
        tracing::debug!(path = %config_path.display(), "No config file, using defaults");
        AppConfig::default()
    };

    for fixed in config.sanitize() {
        tracing::warn!("{fixed}");
    }

    Ok(config)
}

/// Load configuration, logging any error and falling back to defaults.
#[must_use]
pub fn load_config_or_default(path: Option<&Path>) -> AppConfig {
    match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "Configuration could not be loaded, using defaults");
            AppConfig::default()
        }
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file: {e}"),
    })?;

    tracing::info!(path = %path.display(), "Configuration loaded");

    Ok(config)
}

/// Write the commented default configuration if no file exists yet.
///
/// Returns the path and whether a file was created.
///
/// # Errors
/// Returns error if file cannot be created.
pub fn ensure_config_exists(path: Option<&Path>) -> Result<(PathBuf, bool)> {
    let config_path = path.map_or_else(AppConfig::default_config_path, Path::to_path_buf);

    if config_path.exists() {
        return Ok((config_path, false));
    }

    // Ensure parent directory exists
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io("Failed to create config directory", e))?;
    }

    fs::write(&config_path, DEFAULT_CONFIG)
        .map_err(|e| AppError::io("Failed to create default config", e))?;

    tracing::info!(path = %config_path.display(), "Created default configuration");

    Ok((config_path, true))
}

/// Render the effective configuration as TOML.
///
/// # Errors
/// Returns error if serialization fails.
pub fn render_config(config: &AppConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| AppError::Config {
        message: format!("Failed to serialize config: {e}"),
    })
}

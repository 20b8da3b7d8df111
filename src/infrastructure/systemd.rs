//! Systemd service integration.
//!
//! Installs the proxy as a systemd user service so it keeps running in the
//! background and comes back after a crash or logout.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::domain::{AppError, Result};

/// Service unit file name.
const SERVICE_NAME: &str = "rfid-proxy.service";

/// Systemd service manager.
pub struct SystemdService {
    config_path: PathBuf,
}

impl SystemdService {
    /// Manager for a service that runs `serve` with `config_path`.
    #[must_use]
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Get the systemd user directory path.
    fn user_systemd_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| AppError::Config {
            message: "Could not determine home directory".into(),
        })?;

        Ok(home.join(".config/systemd/user"))
    }

    /// Get the service file path.
    fn service_file_path() -> Result<PathBuf> {
        Ok(Self::user_systemd_dir()?.join(SERVICE_NAME))
    }

    /// Generate the systemd unit file content.
    fn generate_unit_file(&self, binary_path: &Path) -> String {
        format!(
            r"[Unit]
Description=RFID reader proxy
After=network.target

[Service]
Type=simple
ExecStart={binary} --config {config} serve
Restart=on-failure
RestartSec=5
Environment=RUST_LOG=info

# Resource limits
MemoryMax=64M

# Security
ProtectSystem=strict
ProtectHome=read-only
NoNewPrivileges=yes
PrivateTmp=yes

[Install]
WantedBy=default.target
",
            binary = binary_path.display(),
            config = self.config_path.display(),
        )
    }

    /// Install the systemd service.
    pub fn install(&self) -> Result<InstallResult> {
        // Ensure systemd user directory exists
        let systemd_dir = Self::user_systemd_dir()?;
        fs::create_dir_all(&systemd_dir)
            .map_err(|e| AppError::io("Failed to create systemd user directory", e))?;

        let binary_path = std::env::current_exe()
            .map_err(|e| AppError::io("Failed to get executable path", e))?;

        let service_path = Self::service_file_path()?;
        let unit_content = self.generate_unit_file(&binary_path);

        fs::write(&service_path, &unit_content)
            .map_err(|e| AppError::io("Failed to write service file", e))?;

        tracing::info!(path = %service_path.display(), "Service file written");

        systemctl(&["daemon-reload"])?;
        systemctl(&["enable", SERVICE_NAME])?;
        systemctl(&["start", SERVICE_NAME])?;

        tracing::info!("Service enabled and started");

        Ok(InstallResult {
            service_path,
            unit_content,
        })
    }

    /// Get service status.
    pub fn get_status(&self) -> Result<ServiceStatus> {
        let is_installed = Self::service_file_path()?.exists();

        if !is_installed {
            return Ok(ServiceStatus {
                is_installed: false,
                is_enabled: false,
                is_running: false,
                status_text: "not installed".into(),
            });
        }

        let is_enabled = systemctl_succeeds(&["is-enabled", SERVICE_NAME])?;
        let is_running = systemctl_succeeds(&["is-active", SERVICE_NAME])?;

        let status_output = Command::new("systemctl")
            .args(["--user", "status", SERVICE_NAME, "--no-pager"])
            .output()
            .map_err(|e| AppError::io("Failed to get service status", e))?;

        Ok(ServiceStatus {
            is_installed,
            is_enabled,
            is_running,
            status_text: String::from_utf8_lossy(&status_output.stdout).to_string(),
        })
    }

    /// Stop, disable and remove the service.
    pub fn uninstall(&self) -> Result<()> {
        // Not running is fine
        let _ = systemctl(&["stop", SERVICE_NAME]);
        if systemctl(&["disable", SERVICE_NAME]).is_err() {
            tracing::warn!("Service may not have been fully disabled");
        }

        let service_path = Self::service_file_path()?;
        if service_path.exists() {
            fs::remove_file(&service_path)
                .map_err(|e| AppError::io("Failed to remove service file", e))?;
        }

        let _ = systemctl(&["daemon-reload"]);

        tracing::info!("Service uninstalled");

        Ok(())
    }

    /// View service logs.
    pub fn view_logs(&self, lines: usize) -> Result<String> {
        let output = Command::new("journalctl")
            .args([
                "--user",
                "-u",
                SERVICE_NAME,
                "-n",
                &lines.to_string(),
                "--no-pager",
            ])
            .output()
            .map_err(|e| AppError::io("Failed to get service logs", e))?;

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Run `systemctl --user <args>`, failing on a non-zero exit.
fn systemctl(args: &[&str]) -> Result<()> {
    if systemctl_succeeds(args)? {
        Ok(())
    } else {
        Err(AppError::Config {
            message: format!("systemctl --user {} failed", args.join(" ")),
        })
    }
}

fn systemctl_succeeds(args: &[&str]) -> Result<bool> {
    let output = Command::new("systemctl")
        .arg("--user")
        .args(args)
        .output()
        .map_err(|e| AppError::io(format!("Failed to run systemctl {}", args.join(" ")), e))?;

    Ok(output.status.success())
}

/// Result of installing the service.
#[derive(Debug)]
pub struct InstallResult {
    /// Path where service file was written.
    pub service_path: PathBuf,
    /// Content of the unit file.
    pub unit_content: String,
}

/// Service status information.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    /// Whether the service file is installed.
    pub is_installed: bool,
    /// Whether the service is enabled to start on login.
    pub is_enabled: bool,
    /// Whether the service is currently running.
    pub is_running: bool,
    /// Full status text from systemctl.
    pub status_text: String,
}

impl ServiceStatus {
    /// Get a short status string.
    #[must_use]
    pub const fn short_status(&self) -> &'static str {
        match (self.is_installed, self.is_enabled, self.is_running) {
            (false, _, _) => "not installed",
            (true, false, false) => "installed, disabled",
            (true, true, false) => "enabled, stopped",
            (true, false, true) => "running (not enabled)",
            (true, true, true) => "running",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_file_runs_serve_with_config() {
        let service = SystemdService::new("/home/op/.rfid-proxy/config.toml");

        let unit = service.generate_unit_file(Path::new("/usr/local/bin/rfid-proxy"));

        assert!(unit.contains(
            "ExecStart=/usr/local/bin/rfid-proxy --config /home/op/.rfid-proxy/config.toml serve"
        ));
        assert!(unit.contains("Restart=on-failure"));
    }

    #[test]
    fn test_service_status_short() {
        let status = ServiceStatus {
            is_installed: true,
            is_enabled: true,
            is_running: false,
            status_text: String::new(),
        };
        assert_eq!(status.short_status(), "enabled, stopped");

        let status = ServiceStatus {
            is_installed: false,
            is_enabled: false,
            is_running: false,
            status_text: String::new(),
        };
        assert_eq!(status.short_status(), "not installed");
    }
}

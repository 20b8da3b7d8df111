//! Configuration model for the proxy.
//!
//! Every section falls back to defaults so a partial or missing file
//! still yields a usable configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::models::MAX_POWER_MW;

/// Where the remote endpoint is published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path prefix of the endpoint.
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8888
}

fn default_path() -> String {
    "/rfid-proxy".to_string()
}

/// Which driver backs the reader session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// In-memory reader configured by the `[simulator]` section.
    #[default]
    Simulated,
}

/// Reader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Preferred serial port. When absent the link goes straight to scanning.
    #[serde(default)]
    pub serial_port: Option<String>,

    /// Logical source (antenna group) to query.
    #[serde(default = "default_logical_source")]
    pub logical_source: String,

    /// RF power in mW, 0 to 199.
    #[serde(default = "default_power")]
    pub power_mw: u32,

    /// Driver backing the session.
    #[serde(default)]
    pub driver: DriverKind,

    /// Upper bound for any single driver call, in milliseconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            serial_port: None,
            logical_source: default_logical_source(),
            power_mw: default_power(),
            driver: DriverKind::default(),
            call_timeout_ms: default_call_timeout(),
        }
    }
}

fn default_logical_source() -> String {
    "Source_0".to_string()
}

const fn default_power() -> u32 {
    MAX_POWER_MW
}

const fn default_call_timeout() -> u64 {
    3000
}

impl ReaderConfig {
    /// Driver call timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Supervisor cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Pause between liveness probes while connected.
    #[serde(default = "default_probe_interval")]
    pub probe_interval_ms: u64,

    /// Pause between connect attempts while recovering.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: default_probe_interval(),
            retry_interval_ms: default_retry_interval(),
        }
    }
}

const fn default_probe_interval() -> u64 {
    2000
}

const fn default_retry_interval() -> u64 {
    1000
}

impl SupervisorConfig {
    /// Probe cadence as a duration.
    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// Recovery cadence as a duration.
    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// In-memory reader used by `driver = "simulated"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Port names the fake OS reports.
    #[serde(default = "default_sim_ports")]
    pub ports: Vec<String>,

    /// Port the fake reader is attached to.
    #[serde(default = "default_sim_reader_port")]
    pub reader_port: String,

    /// Firmware string the fake reader reports.
    #[serde(default = "default_sim_firmware")]
    pub firmware: String,

    /// Tag ids in the field, as hex.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            ports: default_sim_ports(),
            reader_port: default_sim_reader_port(),
            firmware: default_sim_firmware(),
            tags: Vec::new(),
        }
    }
}

fn default_sim_ports() -> Vec<String> {
    vec![default_sim_reader_port()]
}

fn default_sim_reader_port() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_sim_firmware() -> String {
    "SIM-1.0.0".to_string()
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Remote endpoint.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Reader connection.
    #[serde(default)]
    pub reader: ReaderConfig,

    /// Supervisor cadence.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Simulated reader.
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

impl AppConfig {
    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rfid-proxy")
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Address the HTTP endpoint binds to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.service.host, self.service.port)
    }

    /// Endpoint path prefix, normalized to start with `/` and not end with one.
    #[must_use]
    pub fn endpoint_path(&self) -> String {
        let trimmed = self.service.path.trim_matches('/');
        format!("/{trimmed}")
    }

    /// Replace out-of-range values with defaults, returning what was fixed.
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut fixed = Vec::new();

        if self.reader.power_mw > MAX_POWER_MW {
            fixed.push(format!(
                "reader.power_mw = {} is outside 0..={MAX_POWER_MW}, using {MAX_POWER_MW}",
                self.reader.power_mw
            ));
            self.reader.power_mw = MAX_POWER_MW;
        }

        if self.supervisor.probe_interval_ms == 0 {
            fixed.push("supervisor.probe_interval_ms = 0, using default".to_string());
            self.supervisor.probe_interval_ms = default_probe_interval();
        }

        if self.supervisor.retry_interval_ms == 0 {
            fixed.push("supervisor.retry_interval_ms = 0, using default".to_string());
            self.supervisor.retry_interval_ms = default_retry_interval();
        }

        if self.reader.serial_port.as_deref().is_some_and(str::is_empty) {
            self.reader.serial_port = None;
        }

        fixed
    }
}

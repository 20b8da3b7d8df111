//! Infrastructure layer - external adapters (reader driver, ports, HTTP, files).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod config;
pub mod driver;
pub mod http;
pub mod serial_ports;
pub mod simulated;
pub mod systemd;

pub use config::{ensure_config_exists, load_config, load_config_or_default, render_config};
pub use driver::{PortScanner, ReaderDriver, ReaderSession};
pub use serial_ports::SystemPorts;
pub use simulated::SimulatedReader;
pub use systemd::SystemdService;

//! Domain layer - core types shared by the link and the service.
//!
//! This layer contains pure models, configuration and error types
//! without any I/O.

pub mod config;
pub mod error;
pub mod models;

pub use config::{AppConfig, DriverKind, ReaderConfig, SimulatorConfig, SupervisorConfig};
pub use error::{AppError, DriverError, Result};
pub use models::{LinkPhase, LinkStatus, PortEntry, PortKind, Tag, MAX_POWER_MW, POWER_UNKNOWN};

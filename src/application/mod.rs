//! Application layer - the reader link and the service built on it.
//!
//! This layer owns the connection state machine, the supervisor that
//! drives it, and the facade the transport publishes.

pub mod formatter;
pub mod inventory_service;
pub mod reader_link;
pub mod supervisor;

pub use formatter::{format_inventory, format_ports_table, format_status};
pub use inventory_service::{InventoryService, ProxyStatus};
pub use reader_link::{LinkSettings, ReaderLink};
pub use supervisor::Cadence;

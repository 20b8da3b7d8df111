//! Boundary with the reader SDK and the OS port list.
//!
//! The link only talks to hardware through these traits. A vendor binding
//! implements [`ReaderDriver`]; the proxy ships a simulated one.
//! A hardware driver is paired with `SystemPorts` as its [`PortScanner`],
//! while the simulated reader lists its own configured ports.

use std::time::Duration;

use crate::domain::{DriverError, PortEntry, Tag};

/// Opens sessions against one physical transport.
pub trait ReaderDriver: Send + Sync {
    /// Bind a new session to `port`.
    ///
    /// Every call made on the returned session must give up after `timeout`
    /// and report [`DriverError::Timeout`].
    ///
    /// # Errors
    /// Returns error if the port cannot be opened or no reader answers on it.
    fn open(&self, port: &str, timeout: Duration)
        -> Result<Box<dyn ReaderSession>, DriverError>;
}

/// A live driver session. Exclusively owned by the link.
pub trait ReaderSession: Send {
    /// Firmware release string. Also used as the liveness probe.
    ///
    /// # Errors
    /// Returns error if the device does not answer.
    fn firmware_id(&mut self) -> Result<String, DriverError>;

    /// Set RF power in mW.
    ///
    /// # Errors
    /// Returns error if the device rejects the value or does not answer.
    fn set_power(&mut self, power_mw: u32) -> Result<(), DriverError>;

    /// Current RF power in mW.
    ///
    /// # Errors
    /// Returns error if the device does not answer.
    fn power(&mut self) -> Result<u32, DriverError>;

    /// Tags currently visible on `source`.
    ///
    /// # Errors
    /// Returns error if the source is unknown or the device does not answer.
    fn list_tags(&mut self, source: &str) -> Result<Vec<Tag>, DriverError>;

    /// Release the session.
    ///
    /// # Errors
    /// Returns error if the device could not be told to disconnect. The
    /// session is gone either way.
    fn close(self: Box<Self>) -> Result<(), DriverError>;
}

/// Lists the ports the OS currently knows about.
pub trait PortScanner: Send + Sync {
    /// Ports in OS-reported order.
    ///
    /// # Errors
    /// Returns error if the OS enumeration itself fails.
    fn ports(&self) -> Result<Vec<PortEntry>, DriverError>;
}

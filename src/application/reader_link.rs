//! Connection to the physical reader.
//!
//! [`ReaderLink`] owns the driver session, finds the reader again when it
//! moves to another port, and serves inventory and power calls against
//! whichever session is currently installed.
//!
//! Locking: `connect_gate` serializes connect attempts; `connection` guards
//! the installed session and is only held for single driver calls or the
//! swap itself, so requests never wait on a port scan. `live` is written
//! only while `connection` is held and read lock-free for fast failure.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::{AppError, DriverError, LinkPhase, LinkStatus, ReaderConfig, Result, Tag};
use crate::infrastructure::{PortScanner, ReaderDriver, ReaderSession};

/// Immutable link settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Port tried before scanning.
    pub configured_port: Option<String>,
    /// Logical source queried for tags.
    pub logical_source: String,
    /// Power re-applied on every connect, in mW.
    pub target_power_mw: u32,
    /// Bound handed to the driver for each call.
    pub call_timeout: Duration,
}

impl LinkSettings {
    /// Settings from the `[reader]` config section.
    #[must_use]
    pub fn from_config(config: &ReaderConfig) -> Self {
        Self {
            configured_port: config.serial_port.clone(),
            logical_source: config.logical_source.clone(),
            target_power_mw: config.power_mw,
            call_timeout: config.call_timeout(),
        }
    }
}

/// The installed session and the port it is bound to.
struct Connection {
    session: Box<dyn ReaderSession>,
    port: String,
}

#[derive(Debug, Default)]
struct LinkInfo {
    port: Option<String>,
    firmware: Option<String>,
    reconnects: u64,
    last_probe: Option<DateTime<Utc>>,
}

/// Resilient connection to one reader.
pub struct ReaderLink {
    settings: LinkSettings,
    driver: Box<dyn ReaderDriver>,
    scanner: Box<dyn PortScanner>,
    connect_gate: Mutex<()>,
    connection: Mutex<Option<Connection>>,
    live: AtomicBool,
    shutting_down: AtomicBool,
    phase: AtomicU8,
    info: Mutex<LinkInfo>,
}

impl ReaderLink {
    /// Create a disconnected link. Nothing touches the hardware yet.
    #[must_use]
    pub fn new(
        settings: LinkSettings,
        driver: Box<dyn ReaderDriver>,
        scanner: Box<dyn PortScanner>,
    ) -> Self {
        Self {
            settings,
            driver,
            scanner,
            connect_gate: Mutex::new(()),
            connection: Mutex::new(None),
            live: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            phase: AtomicU8::new(LinkPhase::Disconnected as u8),
            info: Mutex::new(LinkInfo::default()),
        }
    }

    fn lock_connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_info(&self) -> MutexGuard<'_, LinkInfo> {
        self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: LinkPhase) {
        // Shutdown is terminal
        let _ = self
            .phase
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != LinkPhase::Shutdown as u8).then_some(phase as u8)
            });
    }

    /// Current state machine phase.
    #[must_use]
    pub fn phase(&self) -> LinkPhase {
        LinkPhase::from(self.phase.load(Ordering::Acquire))
    }

    /// Whether the last probe (or request) found the reader answering.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Establish a fresh session, releasing the current one first.
    ///
    /// Tries the configured port, then every serial port the OS lists, in
    /// order. A port counts only if the reader answers a firmware read on
    /// it. Does not retry; the supervisor calls again later.
    ///
    /// # Errors
    /// Returns [`AppError::NoReader`] if no port hosts a responsive reader,
    /// or [`AppError::ShutDown`] after teardown.
    pub fn connect(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(AppError::ShutDown);
        }

        let _gate = self
            .connect_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let previous = {
            let mut connection = self.lock_connection();
            if self.is_shut_down() {
                return Err(AppError::ShutDown);
            }
            self.live.store(false, Ordering::Release);
            self.set_phase(LinkPhase::Connecting);
            connection.take()
        };

        if let Some(previous) = previous {
            release(previous);
        }

        let (mut fresh, firmware) = match self.locate_reader() {
            Ok(found) => found,
            Err(e) => {
                self.set_phase(LinkPhase::Disconnected);
                self.lock_info().port = None;
                return Err(e);
            }
        };

        self.apply_target_power(&mut fresh);

        let mut connection = self.lock_connection();
        if self.is_shut_down() {
            drop(connection);
            release(fresh);
            return Err(AppError::ShutDown);
        }

        tracing::info!(port = %fresh.port, firmware = %firmware, "Reader connected");

        {
            let mut info = self.lock_info();
            info.port = Some(fresh.port.clone());
            info.firmware = Some(firmware);
            info.reconnects += 1;
        }

        *connection = Some(fresh);
        self.live.store(true, Ordering::Release);
        self.set_phase(LinkPhase::Connected);

        Ok(())
    }

    /// Walk the candidate ports until one answers.
    fn locate_reader(&self) -> Result<(Connection, String)> {
        let mut tried = 0;
        let configured = self.settings.configured_port.as_deref();

        if let Some(port) = configured {
            tried += 1;
            match self.try_port(port) {
                Ok(found) => return Ok(found),
                Err(e) => {
                    tracing::debug!(port, error = %e, "Configured port did not answer");
                }
            }
        }

        let ports = self.scanner.ports().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Serial port enumeration failed");
            Vec::new()
        });

        for entry in ports.iter().filter(|p| p.is_serial()) {
            if Some(entry.name.as_str()) == configured || self.is_shut_down() {
                continue;
            }

            tried += 1;
            tracing::debug!(port = %entry.name, "Trying port");

            match self.try_port(&entry.name) {
                Ok(found) => return Ok(found),
                Err(e) => {
                    tracing::trace!(port = %entry.name, error = %e, "Port did not answer");
                }
            }
        }

        if self.is_shut_down() {
            return Err(AppError::ShutDown);
        }

        tracing::debug!(tried, "No port hosts the reader");

        Err(AppError::NoReader { tried })
    }

    /// Open `port` and confirm a reader answers on it.
    fn try_port(&self, port: &str) -> std::result::Result<(Connection, String), DriverError> {
        let mut session = self.driver.open(port, self.settings.call_timeout)?;

        match session.firmware_id() {
            Ok(firmware) => Ok((
                Connection {
                    session,
                    port: port.to_string(),
                },
                firmware,
            )),
            Err(e) => {
                if let Err(close_err) = session.close() {
                    tracing::trace!(port, error = %close_err, "Closing silent session failed");
                }
                Err(e)
            }
        }
    }

    /// Push the configured power to a fresh session.
    fn apply_target_power(&self, connection: &mut Connection) {
        let target = self.settings.target_power_mw;

        match connection.session.set_power(target) {
            Ok(()) => tracing::info!(power_mw = target, "Reader power set"),
            Err(e) => {
                tracing::warn!(power_mw = target, error = %e, "Failed to set reader power");
            }
        }

        match connection.session.power() {
            Ok(reported) => tracing::info!(power_mw = reported, "Power reported by the reader"),
            Err(e) => tracing::warn!(error = %e, "Failed to read reader power"),
        }
    }

    /// Round-trip the firmware read on the current session.
    ///
    /// `false` when there is no session or the reader does not answer.
    #[must_use]
    pub fn probe(&self) -> bool {
        let mut connection = self.lock_connection();
        probe_session(connection.as_mut())
    }

    /// Probe and record the outcome as the link's liveness.
    pub fn heartbeat(&self) -> bool {
        let mut connection = self.lock_connection();
        let alive = probe_session(connection.as_mut()) && !self.is_shut_down();

        self.live.store(alive, Ordering::Release);
        self.lock_info().last_probe = Some(Utc::now());

        if alive {
            self.set_phase(LinkPhase::Connected);
        } else if self.phase() == LinkPhase::Connected {
            tracing::warn!("Reader stopped answering");
            self.set_phase(LinkPhase::Disconnected);
        }

        alive
    }

    /// Record that the supervisor is retrying connects.
    pub fn begin_recovery(&self) {
        let _connection = self.lock_connection();
        self.live.store(false, Ordering::Release);
        self.set_phase(LinkPhase::Recovering);
    }

    /// Tags currently in the field, as unpadded uppercase hex.
    ///
    /// Fails fast when the link is not live; never waits for a reconnect.
    ///
    /// # Errors
    /// Returns [`AppError::LinkDown`] or [`AppError::ShutDown`] without
    /// touching the reader, or [`AppError::Driver`] if the listing fails,
    /// in which case the link is marked not live.
    pub fn inventory(&self) -> Result<Vec<String>> {
        if self.is_shut_down() {
            return Err(AppError::ShutDown);
        }
        if !self.is_live() {
            return Err(AppError::LinkDown);
        }

        let mut guard = self.lock_connection();
        if !self.is_live() {
            return Err(AppError::LinkDown);
        }
        let connection = guard.as_mut().ok_or(AppError::LinkDown)?;

        match connection.session.list_tags(&self.settings.logical_source) {
            Ok(tags) => Ok(tags.iter().map(Tag::hex_id).collect()),
            Err(e) => {
                self.live.store(false, Ordering::Release);
                self.set_phase(LinkPhase::Disconnected);
                tracing::warn!(error = %e, "Inventory failed, marking link down");
                Err(AppError::driver("inventory", e))
            }
        }
    }

    /// Set RF power on the current session. Failures are logged only.
    pub fn set_power(&self, power_mw: u32) {
        let mut guard = self.lock_connection();

        let Some(connection) = guard.as_mut() else {
            tracing::debug!(power_mw, "No reader session, power not set");
            return;
        };

        match connection.session.set_power(power_mw) {
            Ok(()) => tracing::info!(power_mw, "Reader power set"),
            Err(e) => tracing::warn!(power_mw, error = %e, "Failed to set reader power"),
        }
    }

    /// RF power reported by the reader, `None` if unknown.
    #[must_use]
    pub fn power(&self) -> Option<u32> {
        let mut guard = self.lock_connection();
        let connection = guard.as_mut()?;

        match connection.session.power() {
            Ok(power_mw) => Some(power_mw),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get reader power");
                None
            }
        }
    }

    /// Snapshot of the link for status reporting.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        let info = self.lock_info();

        LinkStatus {
            phase: self.phase(),
            live: self.is_live(),
            port: info.port.clone(),
            firmware: info.firmware.clone(),
            reconnects: info.reconnects,
            last_probe: info.last_probe,
        }
    }

    /// Tear the link down for good and release the session.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let previous = {
            let mut connection = self.lock_connection();
            self.live.store(false, Ordering::Release);
            self.set_phase(LinkPhase::Shutdown);
            connection.take()
        };

        if let Some(previous) = previous {
            release(previous);
        }

        self.lock_info().port = None;

        tracing::info!("Reader link shut down");
    }
}

impl std::fmt::Debug for ReaderLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderLink")
            .field("settings", &self.settings)
            .field("phase", &self.phase())
            .field("live", &self.is_live())
            .finish_non_exhaustive()
    }
}

fn probe_session(connection: Option<&mut Connection>) -> bool {
    let Some(connection) = connection else {
        return false;
    };

    match connection.session.firmware_id() {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(port = %connection.port, error = %e, "Probe failed");
            false
        }
    }
}

/// Best-effort close of a session.
fn release(connection: Connection) {
    let port = connection.port;
    if let Err(e) = connection.session.close() {
        tracing::warn!(port = %port, error = %e, "Failed to release reader session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PortEntry;
    use crate::infrastructure::SimulatedReader;

    const PORTS: [&str; 4] = ["/dev/ttyS0", "/dev/ttyS1", "/dev/ttyUSB0", "/dev/ttyUSB1"];

    fn settings(configured: Option<&str>) -> LinkSettings {
        LinkSettings {
            configured_port: configured.map(String::from),
            logical_source: "Source_0".into(),
            target_power_mw: 150,
            call_timeout: Duration::from_millis(50),
        }
    }

    fn link_with(reader: &SimulatedReader, configured: Option<&str>) -> ReaderLink {
        ReaderLink::new(
            settings(configured),
            Box::new(reader.clone()),
            Box::new(reader.clone()),
        )
    }

    #[test]
    fn test_starts_disconnected() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        let link = link_with(&reader, Some("/dev/ttyUSB0"));

        assert_eq!(link.phase(), LinkPhase::Disconnected);
        assert!(!link.is_live());
        assert!(!link.probe());
        assert!(reader.open_attempts().is_empty());
    }

    #[test]
    fn test_connect_on_configured_port_applies_power() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        let link = link_with(&reader, Some("/dev/ttyUSB0"));

        link.connect().unwrap();

        assert!(link.is_live());
        assert_eq!(reader.open_attempts(), vec!["/dev/ttyUSB0"]);
        assert_eq!(reader.device_power(), 150);

        let status = link.status();
        assert_eq!(status.phase, LinkPhase::Connected);
        assert_eq!(status.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(status.firmware.as_deref(), Some("SIM-1.0.0"));
        assert_eq!(status.reconnects, 1);
    }

    #[test]
    fn test_repeated_connect_keeps_one_session() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        let link = link_with(&reader, Some("/dev/ttyUSB0"));

        for _ in 0..10 {
            link.connect().unwrap();
            assert_eq!(reader.open_sessions(), 1);
        }

        assert!(link.is_live());
        assert_eq!(link.status().reconnects, 10);
    }

    #[test]
    fn test_falls_back_to_scan_and_stops_at_first_answer() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        let link = link_with(&reader, Some("/dev/ttyACM9"));

        link.connect().unwrap();

        assert_eq!(
            reader.open_attempts(),
            vec!["/dev/ttyACM9", "/dev/ttyS0", "/dev/ttyS1", "/dev/ttyUSB0"]
        );
        assert_eq!(link.status().port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(reader.device_power(), 150);
    }

    #[test]
    fn test_scan_without_configured_port() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyS1");
        let link = link_with(&reader, None);

        link.connect().unwrap();

        assert_eq!(reader.open_attempts(), vec!["/dev/ttyS0", "/dev/ttyS1"]);
    }

    #[test]
    fn test_scan_skips_configured_port_and_non_serial_entries() {
        let reader = SimulatedReader::new(&[], "/dev/lp0");
        reader.set_ports(vec![
            PortEntry::serial("/dev/ttyS0"),
            PortEntry::other("/dev/lp0"),
            PortEntry::serial("/dev/ttyS1"),
        ]);
        let link = link_with(&reader, Some("/dev/ttyS1"));

        let err = link.connect().unwrap_err();

        assert!(matches!(err, AppError::NoReader { tried: 2 }));
        assert_eq!(reader.open_attempts(), vec!["/dev/ttyS1", "/dev/ttyS0"]);
        assert!(!link.is_live());
    }

    #[test]
    fn test_open_without_firmware_is_not_live() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB1");
        reader.set_accept_any_port(true);
        let link = link_with(&reader, Some("/dev/ttyS0"));

        link.connect().unwrap();

        // Every port opens, only the last one answers
        assert_eq!(reader.open_attempts().len(), 4);
        assert_eq!(link.status().port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(reader.open_sessions(), 1);
    }

    #[test]
    fn test_exhausted_scan_leaves_link_down_without_looping() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        reader.unplug();
        let link = link_with(&reader, Some("/dev/ttyUSB0"));

        let err = link.connect().unwrap_err();

        assert!(matches!(err, AppError::NoReader { tried: 4 }));
        assert_eq!(reader.open_attempts().len(), 4);
        assert_eq!(link.phase(), LinkPhase::Disconnected);
        assert!(!link.is_live());
        assert_eq!(reader.open_sessions(), 0);
    }

    #[test]
    fn test_connect_releases_stale_session_before_scanning() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        let link = link_with(&reader, Some("/dev/ttyUSB0"));
        link.connect().unwrap();

        // Renumbered by the OS after a replug
        reader.plug_into("/dev/ttyUSB1");
        link.connect().unwrap();

        assert_eq!(reader.open_sessions(), 1);
        assert_eq!(link.status().port.as_deref(), Some("/dev/ttyUSB1"));
        assert!(link.probe());
    }

    #[test]
    fn test_reconnect_reapplies_target_power() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        let link = link_with(&reader, Some("/dev/ttyUSB0"));
        link.connect().unwrap();
        assert_eq!(reader.device_power(), 150);

        reader.plug_into("/dev/ttyUSB1");
        assert_eq!(reader.device_power(), 199);
        link.connect().unwrap();
        assert_eq!(reader.device_power(), 150);

        reader.set_device_power(20);
        link.connect().unwrap();
        assert_eq!(reader.device_power(), 150);
        assert_eq!(link.power(), Some(150));
    }

    #[test]
    fn test_heartbeat_tracks_silent_failure() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        let link = link_with(&reader, Some("/dev/ttyUSB0"));
        link.connect().unwrap();
        assert!(link.heartbeat());

        reader.set_responsive(false);

        assert!(!link.heartbeat());
        assert!(!link.is_live());
        assert_eq!(link.phase(), LinkPhase::Disconnected);
        assert!(link.status().last_probe.is_some());
    }

    #[test]
    fn test_inventory_formats_unpadded_hex() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        reader.set_tags(vec![
            Tag::new([0x00, 0x1A, 0xBF]),
            Tag::new([0xE2, 0x00, 0x34, 0x12]),
        ]);
        let link = link_with(&reader, Some("/dev/ttyUSB0"));
        link.connect().unwrap();

        let inventory = link.inventory().unwrap();

        assert_eq!(inventory, vec!["1ABF", "E2003412"]);
    }

    #[test]
    fn test_inventory_on_down_link_skips_driver() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        let link = link_with(&reader, Some("/dev/ttyUSB0"));
        link.connect().unwrap();
        reader.unplug();
        assert!(!link.heartbeat());

        let err = link.inventory().unwrap_err();

        assert!(matches!(err, AppError::LinkDown));
        assert_eq!(reader.inventory_calls(), 0);
    }

    #[test]
    fn test_failed_inventory_marks_link_down() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        let link = link_with(&reader, Some("/dev/ttyUSB0"));
        link.connect().unwrap();
        reader.unplug();

        let err = link.inventory().unwrap_err();

        assert!(matches!(
            err,
            AppError::Driver {
                operation: "inventory",
                ..
            }
        ));
        assert!(!link.is_live());
        assert!(matches!(link.inventory(), Err(AppError::LinkDown)));
        assert_eq!(reader.inventory_calls(), 1);
    }

    #[test]
    fn test_out_of_range_power_is_absorbed() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        let link = link_with(&reader, Some("/dev/ttyUSB0"));
        link.connect().unwrap();

        link.set_power(250);

        assert_eq!(link.power(), Some(150));
        assert!(link.is_live());
    }

    #[test]
    fn test_power_unknown_without_session() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        let link = link_with(&reader, Some("/dev/ttyUSB0"));

        link.set_power(100);

        assert_eq!(link.power(), None);
    }

    #[test]
    fn test_power_unknown_when_reader_silent() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        let link = link_with(&reader, Some("/dev/ttyUSB0"));
        link.connect().unwrap();
        reader.set_responsive(false);

        assert_eq!(link.power(), None);
    }

    #[test]
    fn test_shutdown_is_terminal() {
        let reader = SimulatedReader::new(&PORTS, "/dev/ttyUSB0");
        let link = link_with(&reader, Some("/dev/ttyUSB0"));
        link.connect().unwrap();

        link.shutdown();
        reader.clear_open_attempts();

        assert_eq!(reader.open_sessions(), 0);
        assert!(matches!(link.connect(), Err(AppError::ShutDown)));
        assert!(matches!(link.inventory(), Err(AppError::ShutDown)));
        assert!(!link.heartbeat());
        link.begin_recovery();
        assert_eq!(link.phase(), LinkPhase::Shutdown);
        assert!(reader.open_attempts().is_empty());
        assert_eq!(link.power(), None);
    }
}

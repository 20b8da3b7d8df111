//! In-memory reader for running the proxy without hardware.
//!
//! [`SimulatedReader`] acts as both the driver and the OS port list. Clones
//! share one simulated world, so a test (or the operator) can unplug the
//! reader, move it to another port or make it stop answering while the
//! link holds a session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::domain::{DriverError, PortEntry, SimulatorConfig, Tag, MAX_POWER_MW};

use super::driver::{PortScanner, ReaderDriver, ReaderSession};

#[derive(Debug)]
struct World {
    ports: Vec<PortEntry>,
    /// Port the reader is cabled to; `None` when unplugged.
    reader_port: Option<String>,
    responsive: bool,
    /// Open succeeds on any listed port; calls only work on the reader's.
    accept_any_port: bool,
    firmware: String,
    sources: Vec<String>,
    tags: Vec<Tag>,
    power_mw: u32,
    /// Bumped on every unplug so older sessions go stale.
    generation: u64,
    open_delay: Duration,
    open_attempts: Vec<String>,
    open_sessions: usize,
    inventory_calls: usize,
}

/// Shared handle to a simulated reader and its port list.
#[derive(Debug, Clone)]
pub struct SimulatedReader {
    world: Arc<Mutex<World>>,
}

impl SimulatedReader {
    /// Reader attached to `reader_port`, with `ports` listed by the OS.
    #[must_use]
    pub fn new(ports: &[&str], reader_port: &str) -> Self {
        let world = World {
            ports: ports.iter().map(|p| PortEntry::serial(*p)).collect(),
            reader_port: Some(reader_port.to_string()),
            responsive: true,
            accept_any_port: false,
            firmware: "SIM-1.0.0".to_string(),
            sources: vec!["Source_0".to_string()],
            tags: Vec::new(),
            power_mw: MAX_POWER_MW,
            generation: 0,
            open_delay: Duration::ZERO,
            open_attempts: Vec::new(),
            open_sessions: 0,
            inventory_calls: 0,
        };

        Self {
            world: Arc::new(Mutex::new(world)),
        }
    }

    /// Build from the `[simulator]` config section.
    #[must_use]
    pub fn from_config(config: &SimulatorConfig, logical_source: &str) -> Self {
        let ports: Vec<&str> = config.ports.iter().map(String::as_str).collect();
        let reader = Self::new(&ports, &config.reader_port);

        let tags = config
            .tags
            .iter()
            .filter_map(|hex_id| match parse_tag(hex_id) {
                Some(tag) => Some(tag),
                None => {
                    tracing::warn!(tag = %hex_id, "Ignoring simulated tag that is not hex");
                    None
                }
            })
            .collect();

        {
            let mut world = reader.lock();
            world.firmware.clone_from(&config.firmware);
            world.sources = vec![logical_source.to_string()];
            world.tags = tags;
        }

        reader
    }

    fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parse a hex tag id, tolerating an odd digit count.
fn parse_tag(hex_id: &str) -> Option<Tag> {
    let digits = hex_id.trim();
    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };

    hex::decode(padded).ok().map(Tag::new)
}

impl ReaderDriver for SimulatedReader {
    fn open(
        &self,
        port: &str,
        timeout: Duration,
    ) -> Result<Box<dyn ReaderSession>, DriverError> {
        let delay = {
            let mut world = self.lock();
            world.open_attempts.push(port.to_string());
            world.open_delay
        };

        if !delay.is_zero() {
            std::thread::sleep(delay.min(timeout));
            if delay > timeout {
                return Err(DriverError::Timeout(timeout));
            }
        }

        let mut world = self.lock();
        let listed = world.ports.iter().any(|p| p.name == port);
        let on_reader = world.reader_port.as_deref() == Some(port);

        if !listed || !((on_reader && world.responsive) || world.accept_any_port) {
            return Err(DriverError::PortUnavailable {
                port: port.to_string(),
                reason: "no reader answered".to_string(),
            });
        }

        world.open_sessions += 1;

        Ok(Box::new(SimulatedSession {
            world: Arc::clone(&self.world),
            port: port.to_string(),
            generation: world.generation,
            timeout,
        }))
    }
}

impl PortScanner for SimulatedReader {
    fn ports(&self) -> Result<Vec<PortEntry>, DriverError> {
        Ok(self.lock().ports.clone())
    }
}

/// Fault injection and accounting for tests.
#[cfg(test)]
impl SimulatedReader {
    /// Replace the tags in the field.
    pub fn set_tags(&self, tags: Vec<Tag>) {
        self.lock().tags = tags;
    }

    /// Replace the OS port list.
    pub fn set_ports(&self, ports: Vec<PortEntry>) {
        self.lock().ports = ports;
    }

    /// Pull the cable. Existing sessions go stale and the device loses
    /// its power setting.
    pub fn unplug(&self) {
        let mut world = self.lock();
        world.reader_port = None;
        world.power_mw = MAX_POWER_MW;
        world.generation += 1;
    }

    /// Plug the reader into `port`, power-cycling it. Existing sessions
    /// stay stale.
    pub fn plug_into(&self, port: &str) {
        let mut world = self.lock();
        world.reader_port = Some(port.to_string());
        world.power_mw = MAX_POWER_MW;
        world.generation += 1;
    }

    /// Change the stored power behind the link's back.
    pub fn set_device_power(&self, power_mw: u32) {
        self.lock().power_mw = power_mw;
    }

    /// Keep the port open but stop (or resume) answering.
    pub fn set_responsive(&self, responsive: bool) {
        self.lock().responsive = responsive;
    }

    /// Let `open` succeed on ports the reader is not on.
    pub fn set_accept_any_port(&self, accept: bool) {
        self.lock().accept_any_port = accept;
    }

    /// Make every `open` take this long.
    pub fn set_open_delay(&self, delay: Duration) {
        self.lock().open_delay = delay;
    }

    /// Ports `open` was called with, in order.
    #[must_use]
    pub fn open_attempts(&self) -> Vec<String> {
        self.lock().open_attempts.clone()
    }

    /// Forget recorded open attempts.
    pub fn clear_open_attempts(&self) {
        self.lock().open_attempts.clear();
    }

    /// Sessions opened and not yet closed.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions
    }

    /// Number of tag listings served or refused by a session.
    #[must_use]
    pub fn inventory_calls(&self) -> usize {
        self.lock().inventory_calls
    }

    /// Power currently stored on the device.
    #[must_use]
    pub fn device_power(&self) -> u32 {
        self.lock().power_mw
    }
}

struct SimulatedSession {
    world: Arc<Mutex<World>>,
    port: String,
    generation: u64,
    timeout: Duration,
}

impl SimulatedSession {
    /// Lock the world and fail unless this session still reaches the reader.
    fn reach(&self) -> Result<MutexGuard<'_, World>, DriverError> {
        let world = self.world.lock().unwrap_or_else(PoisonError::into_inner);

        if world.generation != self.generation
            || world.reader_port.as_deref() != Some(self.port.as_str())
        {
            return Err(DriverError::NotConnected);
        }
        if !world.responsive {
            return Err(DriverError::Timeout(self.timeout));
        }

        Ok(world)
    }
}

impl ReaderSession for SimulatedSession {
    fn firmware_id(&mut self) -> Result<String, DriverError> {
        Ok(self.reach()?.firmware.clone())
    }

    fn set_power(&mut self, power_mw: u32) -> Result<(), DriverError> {
        let mut world = self.reach()?;
        if power_mw > MAX_POWER_MW {
            return Err(DriverError::Rejected(format!(
                "power {power_mw} mW out of range 0..={MAX_POWER_MW}"
            )));
        }
        world.power_mw = power_mw;
        Ok(())
    }

    fn power(&mut self) -> Result<u32, DriverError> {
        Ok(self.reach()?.power_mw)
    }

    fn list_tags(&mut self, source: &str) -> Result<Vec<Tag>, DriverError> {
        {
            let mut world = self.world.lock().unwrap_or_else(PoisonError::into_inner);
            world.inventory_calls += 1;
        }

        let world = self.reach()?;
        if !world.sources.iter().any(|s| s == source) {
            return Err(DriverError::UnknownSource(source.to_string()));
        }
        Ok(world.tags.clone())
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        let mut world = self.world.lock().unwrap_or_else(PoisonError::into_inner);
        world.open_sessions = world.open_sessions.saturating_sub(1);

        if world.generation == self.generation {
            Ok(())
        } else {
            Err(DriverError::NotConnected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[test]
    fn test_open_on_reader_port() {
        let reader = SimulatedReader::new(&["/dev/ttyS0", "/dev/ttyACM0"], "/dev/ttyACM0");

        let mut session = reader.open("/dev/ttyACM0", TIMEOUT).unwrap();

        assert_eq!(session.firmware_id().unwrap(), "SIM-1.0.0");
        assert_eq!(reader.open_sessions(), 1);
        assert!(reader.open("/dev/ttyS0", TIMEOUT).is_err());
    }

    #[test]
    fn test_unplug_makes_session_stale() {
        let reader = SimulatedReader::new(&["/dev/ttyACM0"], "/dev/ttyACM0");
        let mut session = reader.open("/dev/ttyACM0", TIMEOUT).unwrap();

        reader.unplug();

        assert_eq!(session.firmware_id(), Err(DriverError::NotConnected));
        assert!(session.close().is_err());
        assert_eq!(reader.open_sessions(), 0);
    }

    #[test]
    fn test_unresponsive_reader_times_out() {
        let reader = SimulatedReader::new(&["/dev/ttyACM0"], "/dev/ttyACM0");
        let mut session = reader.open("/dev/ttyACM0", TIMEOUT).unwrap();

        reader.set_responsive(false);

        assert_eq!(session.power(), Err(DriverError::Timeout(TIMEOUT)));
    }

    #[test]
    fn test_power_above_range_rejected() {
        let reader = SimulatedReader::new(&["/dev/ttyACM0"], "/dev/ttyACM0");
        let mut session = reader.open("/dev/ttyACM0", TIMEOUT).unwrap();

        session.set_power(120).unwrap();
        assert!(matches!(session.set_power(250), Err(DriverError::Rejected(_))));
        assert_eq!(session.power().unwrap(), 120);
    }

    #[test]
    fn test_open_slower_than_timeout() {
        let reader = SimulatedReader::new(&["/dev/ttyACM0"], "/dev/ttyACM0");
        reader.set_open_delay(Duration::from_millis(200));

        let result = reader.open("/dev/ttyACM0", Duration::from_millis(10));

        assert!(matches!(result, Err(DriverError::Timeout(_))));
    }

    #[test]
    fn test_from_config_parses_tags() {
        let config = SimulatorConfig {
            tags: vec!["1ABF".into(), "ABC".into(), "zz".into()],
            ..SimulatorConfig::default()
        };
        let reader = SimulatedReader::from_config(&config, "Source_0");
        let mut session = reader.open("/dev/ttyACM0", TIMEOUT).unwrap();

        let tags = session.list_tags("Source_0").unwrap();

        assert_eq!(tags, vec![Tag::new([0x1A, 0xBF]), Tag::new([0x0A, 0xBC])]);
        assert!(matches!(
            session.list_tags("Source_9"),
            Err(DriverError::UnknownSource(_))
        ));
    }
}

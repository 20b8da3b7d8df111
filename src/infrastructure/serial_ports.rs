//! OS serial port enumeration backed by the `serialport` crate.
//!
//! Used by `rfid-proxy ports` today and meant as the [`PortScanner`] for
//! any hardware reader driver.

use serialport::{SerialPortInfo, SerialPortType};

use crate::domain::{DriverError, PortEntry, PortKind};

use super::driver::PortScanner;

/// Scanner over the ports the OS exposes right now.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortScanner for SystemPorts {
    fn ports(&self) -> Result<Vec<PortEntry>, DriverError> {
        let ports = serialport::available_ports().map_err(|e| DriverError::Io(e.to_string()))?;

        tracing::debug!(count = ports.len(), "Enumerated serial ports");

        Ok(ports.into_iter().map(port_entry).collect())
    }
}

/// Convert a `serialport` listing entry into our port model.
fn port_entry(info: SerialPortInfo) -> PortEntry {
    let (kind, description) = match info.port_type {
        SerialPortType::UsbPort(usb) => {
            let mut text = format!("USB {:04x}:{:04x}", usb.vid, usb.pid);
            if let Some(product) = usb.product {
                text.push(' ');
                text.push_str(&product);
            }
            if let Some(serial) = usb.serial_number {
                text.push_str(&format!(" (s/n {serial})"));
            }
            (PortKind::Serial, Some(text))
        }
        SerialPortType::PciPort => (PortKind::Serial, Some("PCI".to_string())),
        // Bluetooth RFCOMM links are not cabled readers
        SerialPortType::BluetoothPort => (PortKind::Other, Some("Bluetooth".to_string())),
        SerialPortType::Unknown => (PortKind::Serial, None),
    };

    PortEntry {
        name: info.port_name,
        kind,
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn test_usb_port_is_serial_with_details() {
        let entry = port_entry(SerialPortInfo {
            port_name: "/dev/ttyACM0".into(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x21a0,
                pid: 0x0001,
                serial_number: Some("1234".into()),
                manufacturer: None,
                product: Some("Slate".into()),
            }),
        });

        assert_eq!(entry.kind, PortKind::Serial);
        assert_eq!(
            entry.description.as_deref(),
            Some("USB 21a0:0001 Slate (s/n 1234)")
        );
    }

    #[test]
    fn test_bluetooth_port_is_skipped_kind() {
        let entry = port_entry(SerialPortInfo {
            port_name: "/dev/rfcomm0".into(),
            port_type: SerialPortType::BluetoothPort,
        });

        assert!(!entry.is_serial());
    }
}

//! Serial port discovery and selection

use crate::error::{PortError, Result};
use serialport::SerialPortType;

/// An attached serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device name ("/dev/ttyUSB0", "COM3", ...)
    pub name: String,
    /// Human-readable description
    pub description: String,
}

/// List attached serial ports
pub fn list_serial_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()?;
    log::debug!("Found {} serial port(s)", ports.len());
    Ok(ports
        .into_iter()
        .map(|port| PortInfo {
            description: describe(&port.port_type),
            name: port.port_name,
        })
        .collect())
}

fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let product = usb
                .product
                .as_deref()
                .or(usb.manufacturer.as_deref())
                .unwrap_or("USB serial");
            format!("{} ({:04x}:{:04x})", product, usb.vid, usb.pid)
        }
        SerialPortType::PciPort => "PCI serial".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial".to_string(),
        SerialPortType::Unknown => "n/a".to_string(),
    }
}

/// Pick the port to use
///
/// An explicitly requested port always wins. Otherwise the single attached
/// port is used; none or several is an error.
pub fn select_port(requested: Option<&str>, available: &[PortInfo]) -> Result<String> {
    if let Some(port) = requested {
        return Ok(port.to_string());
    }
    match available {
        [] => Err(PortError::NoPortFound),
        [only] => {
            log::info!("Auto-detected serial port {}", only.name);
            Ok(only.name.clone())
        }
        several => Err(PortError::Ambiguous(
            several.iter().map(|p| p.name.clone()).collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            description: "n/a".to_string(),
        }
    }

    #[test]
    fn test_explicit_port_wins() {
        let ports = [port("/dev/ttyUSB0"), port("/dev/ttyUSB1")];
        assert_eq!(
            select_port(Some("/dev/ttyACM3"), &ports).unwrap(),
            "/dev/ttyACM3"
        );
        assert_eq!(select_port(Some("COM4"), &[]).unwrap(), "COM4");
    }

    #[test]
    fn test_single_port_auto_selected() {
        assert_eq!(
            select_port(None, &[port("/dev/ttyUSB0")]).unwrap(),
            "/dev/ttyUSB0"
        );
    }

    #[test]
    fn test_no_port() {
        assert!(matches!(select_port(None, &[]), Err(PortError::NoPortFound)));
    }

    #[test]
    fn test_several_ports_ambiguous() {
        let ports = [port("COM3"), port("COM4")];
        match select_port(None, &ports) {
            Err(PortError::Ambiguous(candidates)) => assert_eq!(candidates, ["COM3", "COM4"]),
            other => panic!("unexpected {:?}", other),
        }
    }
}

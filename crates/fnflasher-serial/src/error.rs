//! Error types for serial port operations

use fnflasher_core::error::DeviceError;
use thiserror::Error;

/// Serial port errors
#[derive(Debug, Error)]
pub enum PortError {
    /// No serial port is attached
    #[error("No serial port found!")]
    NoPortFound,

    /// Several ports are attached and none was chosen
    #[error("Found more than one serial port ({}), please choose one", .0.join(", "))]
    Ambiguous(Vec<String>),

    /// Error from the serial port driver
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error on an open port
    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type for serial port operations
pub type Result<T> = core::result::Result<T, PortError>;

impl From<std::io::Error> for PortError {
    fn from(e: std::io::Error) -> Self {
        PortError::Io(e.to_string())
    }
}

impl From<PortError> for DeviceError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::Serial(e) if e.kind() == serialport::ErrorKind::NoDevice => {
                DeviceError::Io(format!("device disconnected: {}", e))
            }
            PortError::Io(message) => DeviceError::Io(message),
            other => DeviceError::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_lists_candidates() {
        let err = PortError::Ambiguous(vec!["/dev/ttyUSB0".into(), "/dev/ttyUSB1".into()]);
        assert_eq!(
            err.to_string(),
            "Found more than one serial port (/dev/ttyUSB0, /dev/ttyUSB1), please choose one"
        );
    }

    #[test]
    fn test_into_device_error() {
        let err: DeviceError = PortError::Io("broken pipe".into()).into();
        assert!(matches!(err, DeviceError::Io(_)));
        let err: DeviceError = PortError::NoPortFound.into();
        assert_eq!(err.to_string(), "No serial port found!");
    }
}

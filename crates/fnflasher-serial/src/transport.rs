//! Serial port transport

use crate::error::Result;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Read;
use std::time::Duration;

/// Default read timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// An open serial port, read side only
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `device` at `baud`, 8N1 without flow control
    pub fn open(device: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(device, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(DEFAULT_TIMEOUT)
            .open()?;

        log::info!("Opened serial port {} at {} baud", device, baud);

        Ok(Self { port })
    }

    /// Discard bytes waiting in the receive buffer
    pub fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortError;

    #[test]
    fn test_open_missing_device() {
        let result = SerialTransport::open("/dev/fnflasher-no-such-port", 921_600);
        assert!(matches!(result, Err(PortError::Serial(_))));
    }
}

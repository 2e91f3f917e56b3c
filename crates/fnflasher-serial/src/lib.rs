//! fnflasher-serial - Serial port plumbing
//!
//! - [`ports`] - enumerate ports and pick the one to use
//! - [`transport`] - open a port for reading
//! - [`logs`] - turn a byte stream into timestamped log lines

#![warn(missing_docs)]

pub mod error;
pub mod logs;
pub mod ports;
pub mod transport;

pub use error::{PortError, Result};
pub use logs::{LogLine, SerialLogSink};
pub use ports::{list_serial_ports, select_port, PortInfo};
pub use transport::SerialTransport;

//! Programmer trait definitions
//!
//! The traits are typestated: a [`ChipProgrammer`] yields a
//! [`ChipConnection`] to the ROM bootloader, which is consumed to start the
//! stub loader and yields a [`StubConnection`]. Operations that need the
//! stub cannot be called before it runs.
//!
//! All calls are blocking. The orchestrator runs them on a worker thread.

use super::types::{ChipFamily, ChipInfo};
use crate::error::DeviceResult;
use crate::flash::{FlashChunk, FlashParameters, FlashSize};
use std::io::Read;

/// Entry point of a programmer backend
pub trait ChipProgrammer: Send {
    /// Connection to the ROM bootloader
    type Chip: ChipConnection;

    /// Open `port` and detect the chip
    ///
    /// `family` restricts detection to one chip family when set.
    fn detect_chip(&mut self, port: &str, family: Option<ChipFamily>)
        -> DeviceResult<Self::Chip>;
}

/// Chip in ROM bootloader mode
pub trait ChipConnection: Send {
    /// Connection after the stub loader is running
    type Stub: StubConnection;

    /// Read chip identity
    fn read_chip_info(&mut self) -> DeviceResult<ChipInfo>;

    /// Upload and start the stub loader
    fn run_stub(self) -> DeviceResult<Self::Stub>;
}

/// Chip running the stub loader
pub trait StubConnection: Send {
    /// Ask the stub to switch to `baud` and follow it on the host side
    fn change_baud(&mut self, baud: u32) -> DeviceResult<()>;

    /// Probe the size of the attached flash
    fn detect_flash_size(&mut self) -> DeviceResult<FlashSize>;

    /// Configure flash size, mode and frequency
    fn set_flash_parameters(&mut self, params: &FlashParameters) -> DeviceResult<()>;

    /// Erase the whole flash
    fn erase_flash(&mut self) -> DeviceResult<()>;

    /// Write one chunk at its offset
    fn write_flash(&mut self, chunk: &FlashChunk) -> DeviceResult<()>;

    /// Pulse the reset line so the new firmware starts
    fn hard_reset(&mut self) -> DeviceResult<()>;

    /// Change only the host side baud rate
    fn set_port_baud(&mut self, baud: u32) -> DeviceResult<()>;

    /// Drop any bytes waiting in the host receive buffer
    fn clear_input(&mut self) -> DeviceResult<()>;

    /// Hand the port over as a byte stream for log reading
    fn into_log_reader(self) -> DeviceResult<Box<dyn Read + Send>>;
}

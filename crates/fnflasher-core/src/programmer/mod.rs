//! Chip programmer abstractions
//!
//! The flashing sequence never talks to a serial port directly; it drives a
//! [`ChipProgrammer`] backend through a fixed order of calls.

mod traits;
mod types;

pub use traits::*;
pub use types::{ChipFamily, ChipInfo, Esp32Features};

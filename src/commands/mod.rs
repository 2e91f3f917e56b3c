//! CLI command implementations
//!
//! Catalog commands drive a [`SelectionController`] to completion; flashing
//! commands end in [`flash::flash_job`], which runs the blocking flash
//! sequence on a worker thread and shows progress.
//!
//! [`SelectionController`]: fnflasher_core::selection::SelectionController

pub mod catalog;
pub mod flash;
mod list;
pub mod logs;

pub use list::{list_ports, list_programmers};

/// Error type of the command layer
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type of the command layer
pub type CmdResult<T = ()> = Result<T, BoxError>;

/// Resolve the serial port to use
///
/// Ports are only enumerated when none was requested.
pub fn resolve_port(requested: Option<&str>) -> CmdResult<String> {
    let available = match requested {
        Some(_) => Vec::new(),
        None => fnflasher_serial::list_serial_ports()?,
    };
    Ok(fnflasher_serial::select_port(requested, &available)?)
}

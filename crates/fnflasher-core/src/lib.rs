//! fnflasher-core - Firmware discovery, validation and flashing pipeline
//!
//! This crate holds everything between "the user picked something" and "the
//! chip programmer writes bytes":
//!
//! - [`cache`] / [`fetch`] - cancellable HTTP retrieval with a URL-keyed cache
//! - [`catalog`] - platform and release list documents
//! - [`selection`] - the platform → release → package state machine
//! - [`package`] - firmware package manifest validation and checksums
//! - [`flash`] - flash jobs and the device-programming sequence
//! - [`programmer`] - the traits a chip programmer backend implements
//!
//! # Example
//!
//! ```ignore
//! use fnflasher_core::package::{verify_checksum, PackageResolver};
//!
//! verify_checksum(&bytes, &release.sha256)?;
//! let package = PackageResolver::resolve(&bytes)?;
//! println!("Version: {}", package.info.version);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod cache;
pub mod catalog;
pub mod error;
pub mod fetch;
pub mod flash;
pub mod package;
pub mod programmer;
pub mod selection;

pub use error::{Error, Result};

/// Baud rate the ROM bootloader talks at before any baud change
pub const ROM_BAUD: u32 = 115_200;

/// Baud rate the firmware uses for its run-time log output
pub const LOG_BAUD: u32 = 921_600;

/// Default baud rate for uploading firmware
pub const DEFAULT_UPLOAD_BAUD: u32 = 460_800;

/// Default location of the platform catalog
pub const DEFAULT_CATALOG_URL: &str = "https://fujinet.online/firmware/platforms.json";

//! Error types for fnflasher-core
//!
//! Each stage of the pipeline has its own error enum so callers can tell a
//! rejected package from a device that stopped answering. [`Error`] wraps
//! all of them for code that just needs to report and exit.

use thiserror::Error;

/// Failure reported by a chip programmer backend
#[derive(Debug, Error)]
pub enum DeviceError {
    /// I/O error on the serial connection
    #[error("I/O error: {0}")]
    Io(String),

    /// The device did not answer in time
    #[error("timed out waiting for the device")]
    Timeout,

    /// The device answered with something unexpected
    #[error("unexpected response from device: {0}")]
    Protocol(String),

    /// The backend does not support the requested operation
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// Any other backend failure
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for DeviceError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            DeviceError::Timeout
        } else {
            DeviceError::Io(e.to_string())
        }
    }
}

/// Firmware package validation errors
///
/// Every variant is fatal for the package: it gates a destructive write.
#[derive(Debug, Error)]
pub enum PackageError {
    /// Bytes are not a readable archive
    #[error("firmware package is corrupt: {0}")]
    CorruptPackage(String),

    /// The archive has no manifest document
    #[error("firmware package has no {0}")]
    MissingManifest(&'static str),

    /// A manifest entry lacks a field or carries an unusable value
    #[error("invalid manifest entry #{index}: {reason}")]
    InvalidManifestEntry {
        /// Zero-based position in the `files` list
        index: usize,
        /// What is wrong with the entry
        reason: String,
    },

    /// A manifest entry names a file the archive does not contain
    #[error("firmware package does not contain {0}")]
    MissingPackageFile(String),

    /// Two manifest entries target the same flash offset
    #[error("offset 0x{0:X} is used by more than one file")]
    DuplicateOffset(u32),

    /// No manifest entry is the firmware image
    #[error("firmware package has no firmware entry")]
    MissingFirmwareEntry,

    /// More than one manifest entry claims to be the firmware image
    #[error("firmware package has {0} firmware entries, expected exactly one")]
    AmbiguousFirmwareEntry(usize),

    /// The firmware image header is not valid
    #[error("the firmware binary is invalid: {0}")]
    InvalidFirmwareHeader(String),

    /// The downloaded bytes do not hash to the published digest
    #[error("checksum mismatch: expected sha256 {expected}, got {actual}")]
    ChecksumMismatch {
        /// Digest published for the release
        expected: String,
        /// Digest of the bytes we have
        actual: String,
    },
}

/// Errors from the flashing sequence
///
/// The variant names the step that failed; the device is left in whatever
/// state that step left it.
#[derive(Debug, Error)]
pub enum FlashError {
    /// Another job already owns this serial port
    #[error("serial port {0} is already in use by another flash job")]
    PortBusy(String),

    /// Chip detection failed
    #[error("Error detecting chip on {port}: {source}")]
    ChipDetection {
        /// Port the detection ran on
        port: String,
        /// Backend failure
        #[source]
        source: DeviceError,
    },

    /// Reading chip identity failed
    #[error("Error reading chip information: {0}")]
    ChipInfo(#[source] DeviceError),

    /// Uploading or starting the stub loader failed
    #[error("Error running flasher stub: {0}")]
    StubFailed(#[source] DeviceError),

    /// The stub refused the upload baud rate
    #[error("Error changing ESP upload baud rate to {baud}: {source}")]
    BaudChangeFailed {
        /// Requested baud rate
        baud: u32,
        /// Backend failure
        #[source]
        source: DeviceError,
    },

    /// Flash size detection failed
    #[error("Error detecting flash size: {0}")]
    FlashSizeDetection(#[source] DeviceError),

    /// Setting flash parameters failed
    #[error("Error setting flash parameters: {0}")]
    SetParameters(#[source] DeviceError),

    /// Erase failed
    #[error("Error while erasing flash: {0}")]
    EraseFailed(#[source] DeviceError),

    /// A chunk write failed
    #[error("Error while writing flash at 0x{offset:08X}: {source}")]
    WriteFailed {
        /// Offset of the chunk being written
        offset: u32,
        /// Backend failure
        #[source]
        source: DeviceError,
    },

    /// The hard reset failed
    #[error("Error while resetting the device: {0}")]
    ResetFailed(#[source] DeviceError),

    /// Restoring the log baud rate failed
    #[error("Error restoring log baud rate: {0}")]
    LogHandoff(#[source] DeviceError),

    /// The flash worker thread went away without reporting an outcome
    #[error("flash worker terminated unexpectedly")]
    WorkerLost,
}

/// Misuse of the selection state machine
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    /// The operation is not valid in the current phase
    #[error("cannot {operation} while {phase}")]
    InvalidTransition {
        /// Operation that was attempted
        operation: &'static str,
        /// Phase the controller was in
        phase: &'static str,
    },
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Package validation failed
    #[error(transparent)]
    Package(#[from] PackageError),

    /// The flashing sequence failed
    #[error(transparent)]
    Flash(#[from] FlashError),

    /// Selection state machine misuse
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// A download did not complete
    #[error("download of {url} failed: {message}")]
    Fetch {
        /// URL that was requested
        url: String,
        /// Reason reported by the fetcher
        message: String,
    },

    /// A URL could not be resolved
    #[error("invalid URL {0}")]
    InvalidUrl(String),
}

/// Result type alias using the core [`Error`]
pub type Result<T> = core::result::Result<T, Error>;

/// Result type alias for chip programmer backends
pub type DeviceResult<T> = core::result::Result<T, DeviceError>;

//! Firmware image header
//!
//! Layout of the first bytes of an application image:
//!
//! | Offset | Contents |
//! |--------|----------|
//! | 0 | magic `0xE9` |
//! | 1 | segment count |
//! | 2 | flash mode |
//! | 3 | flash size (high nibble), flash frequency (low nibble) |

use crate::error::PackageError;
use crate::flash::{FlashFrequency, FlashMode};

/// Magic byte at the start of every application image
pub const IMAGE_MAGIC: u8 = 0xE9;

/// Number of header bytes inspected
pub const HEADER_LEN: usize = 4;

/// Flash settings read from an image header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareHeader {
    /// Flash access mode
    pub flash_mode: FlashMode,
    /// Flash clock frequency
    pub flash_frequency: FlashFrequency,
}

impl FirmwareHeader {
    /// Validate the magic byte and decode mode/frequency
    pub fn parse(image: &[u8]) -> Result<Self, PackageError> {
        let Some(header) = image.get(..HEADER_LEN) else {
            return Err(PackageError::InvalidFirmwareHeader(format!(
                "image is only {} bytes long",
                image.len()
            )));
        };

        let magic = header[0];
        if magic != IMAGE_MAGIC {
            return Err(PackageError::InvalidFirmwareHeader(format!(
                "magic byte={:02X}, should be {:02X}",
                magic, IMAGE_MAGIC
            )));
        }

        let flash_mode = FlashMode::from_header_byte(header[2]).ok_or_else(|| {
            PackageError::InvalidFirmwareHeader(format!("unknown flash mode {}", header[2]))
        })?;
        let flash_frequency = FlashFrequency::from_header_nibble(header[3]).ok_or_else(|| {
            PackageError::InvalidFirmwareHeader(format!(
                "unknown flash frequency {:X}",
                header[3] & 0x0F
            ))
        })?;

        Ok(Self {
            flash_mode,
            flash_frequency,
        })
    }
}

//! Flash job description
//!
//! A [`FlashJob`] is the only thing the orchestrator accepts as input. It is
//! built once a package has passed validation and never changes afterwards.

use crate::error::PackageError;
use bytes::Bytes;
use std::collections::HashSet;
use std::fmt;

/// SPI flash access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashMode {
    /// Quad I/O
    Qio,
    /// Quad output
    Qout,
    /// Dual I/O
    Dio,
    /// Dual output
    Dout,
}

impl FlashMode {
    /// Decode the mode byte of an image header
    pub fn from_header_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Qio),
            1 => Some(Self::Qout),
            2 => Some(Self::Dio),
            3 => Some(Self::Dout),
            _ => None,
        }
    }

    /// Name as used by the chip tools ("qio", "dio", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qio => "qio",
            Self::Qout => "qout",
            Self::Dio => "dio",
            Self::Dout => "dout",
        }
    }
}

impl fmt::Display for FlashMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SPI flash clock frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashFrequency {
    /// 40 MHz
    Freq40M,
    /// 26 MHz
    Freq26M,
    /// 20 MHz
    Freq20M,
    /// 80 MHz
    Freq80M,
}

impl FlashFrequency {
    /// Decode the low nibble of the size/frequency header byte
    pub fn from_header_nibble(value: u8) -> Option<Self> {
        match value & 0x0F {
            0x0 => Some(Self::Freq40M),
            0x1 => Some(Self::Freq26M),
            0x2 => Some(Self::Freq20M),
            0xF => Some(Self::Freq80M),
            _ => None,
        }
    }

    /// Name as used by the chip tools ("40m", "80m", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Freq40M => "40m",
            Self::Freq26M => "26m",
            Self::Freq20M => "20m",
            Self::Freq80M => "80m",
        }
    }

    /// Frequency in MHz
    pub fn mhz(&self) -> u32 {
        match self {
            Self::Freq40M => 40,
            Self::Freq26M => 26,
            Self::Freq20M => 20,
            Self::Freq80M => 80,
        }
    }
}

impl fmt::Display for FlashFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical flash size reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashSize(pub u32);

impl FlashSize {
    /// Size in bytes
    pub fn bytes(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FlashSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.0;
        if size >= 1024 * 1024 && size % (1024 * 1024) == 0 {
            write!(f, "{}MB", size / (1024 * 1024))
        } else if size >= 1024 && size % 1024 == 0 {
            write!(f, "{}KB", size / 1024)
        } else {
            write!(f, "{}B", size)
        }
    }
}

/// One file to write at a flash offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashChunk {
    /// Destination offset in flash
    pub offset: u32,
    /// Name of the file the data came from
    pub name: String,
    /// Bytes to write
    pub data: Bytes,
}

/// Validated set of writes plus the image's flash settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashJob {
    chunks: Vec<FlashChunk>,
    mode: FlashMode,
    frequency: FlashFrequency,
}

impl FlashJob {
    /// Build a job; every chunk must target a distinct offset
    pub fn new(
        chunks: Vec<FlashChunk>,
        mode: FlashMode,
        frequency: FlashFrequency,
    ) -> Result<Self, PackageError> {
        let mut offsets = HashSet::new();
        for chunk in &chunks {
            if !offsets.insert(chunk.offset) {
                return Err(PackageError::DuplicateOffset(chunk.offset));
            }
        }
        Ok(Self {
            chunks,
            mode,
            frequency,
        })
    }

    /// Chunks in manifest order
    pub fn chunks(&self) -> &[FlashChunk] {
        &self.chunks
    }

    /// Flash mode from the firmware header
    pub fn mode(&self) -> FlashMode {
        self.mode
    }

    /// Flash frequency from the firmware header
    pub fn frequency(&self) -> FlashFrequency {
        self.frequency
    }

    /// Total number of bytes to write
    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.data.len()).sum()
    }
}

/// Parameters handed to the stub before erase/write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashParameters {
    /// Flash size detected on the device
    pub size: FlashSize,
    /// Access mode from the image
    pub mode: FlashMode,
    /// Clock frequency from the image
    pub frequency: FlashFrequency,
}

//! Chip identity types reported by programmer backends

use bitflags::bitflags;
use std::fmt;

/// Chip family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipFamily {
    /// ESP8266
    Esp8266,
    /// ESP32
    Esp32,
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Esp8266 => f.write_str("ESP8266"),
            Self::Esp32 => f.write_str("ESP32"),
        }
    }
}

bitflags! {
    /// ESP32 capability flags read from eFuses
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Esp32Features: u8 {
        /// Bluetooth radio present
        const BLUETOOTH              = 1 << 0;
        /// Flash embedded in the package
        const EMBEDDED_FLASH         = 1 << 1;
        /// ADC calibrated at the factory
        const FACTORY_CALIBRATED_ADC = 1 << 2;
    }
}

/// Identity of a detected chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChipInfo {
    /// ESP8266 identity
    Esp8266 {
        /// Chip model description
        model: String,
        /// Station MAC address
        mac: [u8; 6],
        /// 32-bit chip id
        chip_id: u32,
    },
    /// ESP32 identity
    Esp32 {
        /// Chip model description
        model: String,
        /// Station MAC address
        mac: [u8; 6],
        /// Number of CPU cores
        num_cores: u8,
        /// Maximum CPU frequency in MHz
        cpu_frequency_mhz: u32,
        /// Capability flags
        features: Esp32Features,
    },
}

impl ChipInfo {
    /// Family discriminant
    pub fn family(&self) -> ChipFamily {
        match self {
            Self::Esp8266 { .. } => ChipFamily::Esp8266,
            Self::Esp32 { .. } => ChipFamily::Esp32,
        }
    }

    /// Chip model description
    pub fn model(&self) -> &str {
        match self {
            Self::Esp8266 { model, .. } | Self::Esp32 { model, .. } => model,
        }
    }

    /// MAC address
    pub fn mac(&self) -> [u8; 6] {
        match self {
            Self::Esp8266 { mac, .. } | Self::Esp32 { mac, .. } => *mac,
        }
    }

    /// MAC address as "AA:BB:CC:DD:EE:FF"
    pub fn mac_string(&self) -> String {
        self.mac()
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Human-readable description, one " - Key: value" line per field
    pub fn describe(&self) -> Vec<String> {
        let mut lines = vec![
            format!(" - Chip Family: {}", self.family()),
            format!(" - Chip Model: {}", self.model()),
        ];
        match self {
            Self::Esp32 {
                num_cores,
                cpu_frequency_mhz,
                features,
                ..
            } => {
                let yes_no = |flag| if features.contains(flag) { "YES" } else { "NO" };
                lines.push(format!(" - Number of Cores: {}", num_cores));
                lines.push(format!(" - Max CPU Frequency: {}MHz", cpu_frequency_mhz));
                lines.push(format!(
                    " - Has Bluetooth: {}",
                    yes_no(Esp32Features::BLUETOOTH)
                ));
                lines.push(format!(
                    " - Has Embedded Flash: {}",
                    yes_no(Esp32Features::EMBEDDED_FLASH)
                ));
                lines.push(format!(
                    " - Has Factory-Calibrated ADC: {}",
                    yes_no(Esp32Features::FACTORY_CALIBRATED_ADC)
                ));
            }
            Self::Esp8266 { chip_id, .. } => {
                lines.push(format!(" - Chip ID: {:08X}", chip_id));
            }
        }
        lines.push(format!(" - MAC Address: {}", self.mac_string()));
        lines
    }
}

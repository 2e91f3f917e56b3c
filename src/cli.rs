//! CLI argument parsing

use crate::programmers;
use clap::{Args, Parser, Subcommand};

/// Generate dynamic help text for the programmer argument
fn programmer_help() -> String {
    format!(
        "Programmer backend to use [available: {}]",
        programmers::programmer_names_short()
    )
}

#[derive(Parser)]
#[command(name = "fnflasher")]
#[command(author, version, about = "FujiNet firmware flasher", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// URL of the platform catalog
    #[arg(long, global = true, default_value = fnflasher_core::DEFAULT_CATALOG_URL)]
    pub catalog_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Device options shared by the flashing commands
#[derive(Args, Debug, Clone)]
pub struct FlashArgs {
    /// Serial port (auto-detected if only one is attached)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate to upload at
    #[arg(long, default_value_t = fnflasher_core::DEFAULT_UPLOAD_BAUD)]
    pub upload_baud_rate: u32,

    /// Only accept an ESP8266
    #[arg(long, conflicts_with = "esp32")]
    pub esp8266: bool,

    /// Only accept an ESP32
    #[arg(long)]
    pub esp32: bool,

    /// Don't erase the flash before writing
    #[arg(long)]
    pub no_erase: bool,

    /// Don't show device logs after flashing
    #[arg(long)]
    pub no_logs: bool,

    #[arg(long, help = programmer_help())]
    pub programmer: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Flash a firmware package or image
    Flash {
        #[command(flatten)]
        device: FlashArgs,

        /// Expected SHA-256 of SOURCE (hex)
        #[arg(long)]
        sha256: Option<String>,

        /// SOURCE is a bare firmware image, written at 0x10000
        #[arg(long)]
        raw: bool,

        /// Local path or http(s) URL of the firmware
        source: String,
    },

    /// Download a release from the catalog and flash it
    Install {
        #[command(flatten)]
        device: FlashArgs,

        /// Platform name
        #[arg(long)]
        platform: String,

        /// Release version
        #[arg(long)]
        release: String,
    },

    /// List platforms in the catalog
    Platforms,

    /// List releases of a platform
    Releases {
        /// Platform name
        #[arg(long)]
        platform: String,
    },

    /// Show device logs
    Logs {
        /// Serial port (auto-detected if only one is attached)
        #[arg(short, long)]
        port: Option<String>,
    },

    /// List attached serial ports
    ListPorts,

    /// List supported programmer backends
    ListProgrammers,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_defaults() {
        let cli =
            Cli::try_parse_from(["fnflasher", "flash", "--programmer", "dummy", "fw.zip"]).unwrap();
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.catalog_url, fnflasher_core::DEFAULT_CATALOG_URL);
        match cli.command {
            Commands::Flash {
                device,
                sha256,
                raw,
                source,
            } => {
                assert_eq!(source, "fw.zip");
                assert_eq!(device.upload_baud_rate, 460_800);
                assert_eq!(device.programmer, "dummy");
                assert!(device.port.is_none());
                assert!(!device.no_erase);
                assert!(sha256.is_none());
                assert!(!raw);
            }
            _ => panic!("expected flash command"),
        }
    }

    #[test]
    fn test_programmer_required() {
        assert!(Cli::try_parse_from(["fnflasher", "flash", "fw.zip"]).is_err());
        assert!(Cli::try_parse_from([
            "fnflasher", "install", "--platform", "ATARI", "--release", "v1.3"
        ])
        .is_err());
    }

    #[test]
    fn test_chip_family_flags_conflict() {
        assert!(Cli::try_parse_from([
            "fnflasher",
            "flash",
            "--programmer",
            "dummy",
            "--esp8266",
            "--esp32",
            "fw.bin"
        ])
        .is_err());
    }

    #[test]
    fn test_install_args() {
        let cli = Cli::try_parse_from([
            "fnflasher",
            "-vv",
            "install",
            "--platform",
            "ATARI",
            "--release",
            "v1.3",
            "--port",
            "/dev/ttyUSB0",
            "--no-erase",
            "--programmer",
            "emulator",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Install {
                device,
                platform,
                release,
            } => {
                assert_eq!(platform, "ATARI");
                assert_eq!(release, "v1.3");
                assert_eq!(device.port.as_deref(), Some("/dev/ttyUSB0"));
                assert!(device.no_erase);
                assert_eq!(device.programmer, "emulator");
            }
            _ => panic!("expected install command"),
        }
    }
}

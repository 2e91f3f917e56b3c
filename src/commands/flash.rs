//! Flash command implementation

use super::{logs, resolve_port, CmdResult};
use crate::cli::FlashArgs;
use crate::programmers::{self, ProgrammerTask};
use bytes::Bytes;
use fnflasher_core::fetch::{ArtifactFetcher, FetchStatus};
use fnflasher_core::flash::{FlashEvent, FlashJob, FlashOptions, FlashOrchestrator};
use fnflasher_core::package::{
    verify_checksum, FirmwarePackage, PackageResolver, DEFAULT_FIRMWARE_OFFSET,
};
use fnflasher_core::programmer::{ChipFamily, ChipProgrammer};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Flash a package or raw image from a path or URL
pub async fn cmd_flash(
    fetcher: &ArtifactFetcher,
    device: &FlashArgs,
    source: &str,
    sha256: Option<&str>,
    raw: bool,
) -> CmdResult {
    let data = load_source(fetcher, source).await?;
    if let Some(expected) = sha256 {
        verify_checksum(&data, expected)?;
    }

    let job = if raw {
        PackageResolver::resolve_image(data, DEFAULT_FIRMWARE_OFFSET)?
    } else {
        let package = PackageResolver::resolve(&data)?;
        print_package_info(&package);
        package.job
    };
    flash_job(device, job).await
}

/// Read firmware bytes from an http(s) URL or a local file
pub async fn load_source(fetcher: &ArtifactFetcher, source: &str) -> CmdResult<Bytes> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let url = Url::parse(source)
            .map_err(|_| fnflasher_core::Error::InvalidUrl(source.to_string()))?;
        let result = fetcher.fetch(url, false).result().await;
        return match result.status {
            FetchStatus::Ok => Ok(result.data.unwrap_or_default()),
            FetchStatus::Error => Err(fnflasher_core::Error::Fetch {
                url: source.to_string(),
                message: result.error.unwrap_or_default(),
            }
            .into()),
            FetchStatus::Aborted => Err("Download cancelled".into()),
        };
    }

    let path = Path::new(source);
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    println!("Read {} bytes from {}", data.len(), path.display());
    Ok(Bytes::from(data))
}

/// Print the release metadata of a package
pub fn print_package_info(package: &FirmwarePackage) {
    println!("Firmware version: {}", package.info.version);
    if !package.info.version_date.is_empty() {
        println!("Version date: {}", package.info.version_date);
    }
    if !package.info.git_commit.is_empty() {
        println!("Git commit: {}", package.info.git_commit);
    }
    for entry in &package.entries {
        println!("  0x{:08X}  {}", entry.offset, entry.filename);
    }
}

/// Run `job` against the device described by `device`
pub async fn flash_job(device: &FlashArgs, job: FlashJob) -> CmdResult {
    let info = programmers::programmer_info(&device.programmer)?;
    // Backends without a serial link still get a name for the port lease
    let port = if info.needs_port {
        resolve_port(device.port.as_deref())?
    } else {
        device.port.clone().unwrap_or_else(|| info.name.to_string())
    };
    let family = if device.esp8266 {
        Some(ChipFamily::Esp8266)
    } else if device.esp32 {
        Some(ChipFamily::Esp32)
    } else {
        None
    };
    let task = FlashTaskArgs {
        port,
        job,
        options: FlashOptions {
            upload_baud: device.upload_baud_rate,
            no_erase: device.no_erase,
            family,
        },
        show_logs: !device.no_logs,
    };
    let programmer = device.programmer.clone();

    tokio::task::spawn_blocking(move || -> CmdResult {
        programmers::with_programmer(&programmer, task)?
    })
    .await?
}

struct FlashTaskArgs {
    port: String,
    job: FlashJob,
    options: FlashOptions,
    show_logs: bool,
}

impl ProgrammerTask for FlashTaskArgs {
    type Output = CmdResult;

    fn run<P: ChipProgrammer + 'static>(self, programmer: P) -> CmdResult {
        let mut progress = FlashProgress::new(self.job.total_bytes() as u64);
        let orchestrator = FlashOrchestrator::new();
        let task = orchestrator.spawn(programmer, self.port.clone(), self.job, self.options)?;

        for event in task.events() {
            progress.handle(event);
        }
        let outcome = task.wait();
        progress.abandon();
        let outcome = outcome?;

        println!(
            "Flashed {} ({} flash) on {}",
            outcome.chip.model(),
            outcome.flash_size,
            self.port
        );

        if self.show_logs {
            println!("Showing logs (Ctrl-C to stop)");
            logs::print_logs(outcome.log_reader);
        }
        Ok(())
    }
}

/// Create a standard progress bar style
fn create_progress_bar_style() -> Result<ProgressStyle, indicatif::style::TemplateError> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}")?
        .progress_chars("#>-"))
}

/// Create a standard spinner style
fn create_spinner_style() -> Result<ProgressStyle, indicatif::style::TemplateError> {
    ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
}

/// Progress reporter using indicatif progress bars
struct FlashProgress {
    total: u64,
    spinner: Option<ProgressBar>,
    bar: Option<ProgressBar>,
}

impl FlashProgress {
    fn new(total: u64) -> Self {
        Self {
            total,
            spinner: None,
            bar: None,
        }
    }

    fn handle(&mut self, event: FlashEvent) {
        match event {
            FlashEvent::Erasing => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb.set_message("Erasing flash (this may take a while)...");
                pb.enable_steady_tick(Duration::from_millis(100));
                self.spinner = Some(pb);
            }
            FlashEvent::Writing { offset, name, .. } => {
                if let Some(pb) = self.spinner.take() {
                    pb.finish_with_message("Erase complete");
                }
                let total = self.total;
                let pb = self.bar.get_or_insert_with(|| {
                    let pb = ProgressBar::new(total);
                    pb.set_style(
                        create_progress_bar_style().unwrap_or_else(|_| ProgressStyle::default_bar()),
                    );
                    pb
                });
                pb.set_message(format!("{} @ 0x{:X}", name, offset));
            }
            FlashEvent::Written { written, .. } => {
                if let Some(pb) = &self.bar {
                    pb.set_position(written as u64);
                }
            }
            FlashEvent::Resetting => {
                if let Some(pb) = self.bar.take() {
                    pb.finish_with_message("Write complete");
                }
            }
            _ => {}
        }
    }

    /// Stop any bar still running after a failure
    fn abandon(&mut self) {
        for pb in [self.spinner.take(), self.bar.take()].into_iter().flatten() {
            pb.abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnflasher_core::cache::ArtifactCache;
    use std::io::Write;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_load_source_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xE9, 0x03, 0x02, 0x20]).unwrap();

        let fetcher = ArtifactFetcher::new(Arc::new(ArtifactCache::new()));
        let data = load_source(&fetcher, file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(&data[..], &[0xE9, 0x03, 0x02, 0x20]);
    }

    #[tokio::test]
    async fn test_load_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("firmware.zip");

        let fetcher = ArtifactFetcher::new(Arc::new(ArtifactCache::new()));
        let err = load_source(&fetcher, missing.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to read"));
    }

    fn dummy_args() -> FlashArgs {
        FlashArgs {
            port: None,
            upload_baud_rate: fnflasher_core::DEFAULT_UPLOAD_BAUD,
            esp8266: false,
            esp32: false,
            no_erase: false,
            no_logs: true,
            programmer: "dummy".to_string(),
        }
    }

    #[cfg(feature = "dummy")]
    #[tokio::test]
    async fn test_flash_job_dummy_skips_port_lookup() {
        let job =
            PackageResolver::resolve_image(Bytes::from(vec![0xE9, 0x03, 0x02, 0x20]), 0x10000)
                .unwrap();
        flash_job(&dummy_args(), job).await.unwrap();
    }

    #[tokio::test]
    async fn test_flash_job_unknown_programmer() {
        let job =
            PackageResolver::resolve_image(Bytes::from(vec![0xE9, 0x03, 0x02, 0x20]), 0x10000)
                .unwrap();
        let args = FlashArgs {
            programmer: "esptool".to_string(),
            ..dummy_args()
        };
        let err = flash_job(&args, job).await.unwrap_err();
        assert!(err.to_string().starts_with("Unknown programmer: esptool"));
    }

    #[test]
    fn test_progress_tracks_write_events() {
        let mut progress = FlashProgress::new(10);
        progress.handle(FlashEvent::Erasing);
        assert!(progress.spinner.is_some());
        progress.handle(FlashEvent::Writing {
            offset: 0x10000,
            name: "firmware.bin".to_string(),
            len: 10,
        });
        assert!(progress.spinner.is_none());
        progress.handle(FlashEvent::Written {
            written: 10,
            total: 10,
        });
        assert_eq!(progress.bar.as_ref().unwrap().position(), 10);
        progress.handle(FlashEvent::Resetting);
        assert!(progress.bar.is_none());
    }
}

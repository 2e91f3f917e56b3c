//! Flashing sequence
//!
//! [`FlashOrchestrator::run`] drives a [`ChipProgrammer`] through the fixed
//! order detect → stub → baud → size → parameters → erase → write → reset →
//! log handoff. The first failing step ends the job; nothing is retried or
//! rolled back.

use crate::error::FlashError;
use crate::flash::{FlashJob, FlashParameters, FlashSize};
use crate::programmer::{ChipConnection, ChipFamily, ChipInfo, ChipProgrammer, StubConnection};
use crate::{DEFAULT_UPLOAD_BAUD, LOG_BAUD, ROM_BAUD};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Pause between switching to the log baud rate and flushing the input
pub const LOG_HANDOFF_DELAY: Duration = Duration::from_millis(50);

/// Options for one flash job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashOptions {
    /// Baud rate used while uploading
    pub upload_baud: u32,
    /// Skip the full chip erase
    pub no_erase: bool,
    /// Only accept this chip family
    pub family: Option<ChipFamily>,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            upload_baud: DEFAULT_UPLOAD_BAUD,
            no_erase: false,
            family: None,
        }
    }
}

/// Progress of a running job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashEvent {
    /// The chip answered and identified itself
    ChipDetected(ChipInfo),
    /// The stub loader is running
    StubRunning,
    /// Upload baud rate is active
    BaudChanged(u32),
    /// Flash size was probed
    FlashSizeDetected(FlashSize),
    /// Flash parameters were configured
    ParametersSet(FlashParameters),
    /// Full erase started
    Erasing,
    /// A chunk is about to be written
    Writing {
        /// Destination offset
        offset: u32,
        /// File name of the chunk
        name: String,
        /// Chunk length in bytes
        len: usize,
    },
    /// A chunk was written
    Written {
        /// Bytes written so far, across all chunks
        written: usize,
        /// Total bytes in the job
        total: usize,
    },
    /// Hard reset started
    Resetting,
    /// The job finished and the port is ready for log reading
    Done,
}

/// Receiver of [`FlashEvent`]s
pub trait FlashReporter {
    /// Called once per event, in sequence order
    fn report(&mut self, event: FlashEvent);
}

impl FlashReporter for mpsc::Sender<FlashEvent> {
    fn report(&mut self, event: FlashEvent) {
        // The receiver may have stopped listening; the job carries on.
        let _ = self.send(event);
    }
}

impl FlashReporter for Vec<FlashEvent> {
    fn report(&mut self, event: FlashEvent) {
        self.push(event);
    }
}

/// Result of a successful job
pub struct FlashOutcome {
    /// Identity of the flashed chip
    pub chip: ChipInfo,
    /// Detected flash size
    pub flash_size: FlashSize,
    /// Serial connection at the log baud rate, handed off for log reading
    pub log_reader: Box<dyn Read + Send>,
}

impl fmt::Debug for FlashOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlashOutcome")
            .field("chip", &self.chip)
            .field("flash_size", &self.flash_size)
            .finish_non_exhaustive()
    }
}

/// Exclusive claim on a serial port, released on drop
#[derive(Debug)]
pub struct PortLease {
    port: String,
    busy: Arc<Mutex<HashSet<String>>>,
}

impl PortLease {
    /// Port this lease holds
    pub fn port(&self) -> &str {
        &self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.busy.lock().remove(&self.port);
        log::trace!("released port {}", self.port);
    }
}

/// A job running on a worker thread
pub struct FlashTask {
    events: mpsc::Receiver<FlashEvent>,
    outcome: mpsc::Receiver<Result<FlashOutcome, FlashError>>,
    worker: thread::JoinHandle<()>,
}

impl FlashTask {
    /// Progress events; iteration ends when the job finishes
    pub fn events(&self) -> &mpsc::Receiver<FlashEvent> {
        &self.events
    }

    /// Wait for the job to finish
    pub fn wait(self) -> Result<FlashOutcome, FlashError> {
        let outcome = self.outcome.recv().unwrap_or(Err(FlashError::WorkerLost));
        if self.worker.join().is_err() {
            log::error!("flash worker panicked");
            return Err(FlashError::WorkerLost);
        }
        outcome
    }
}

/// Runs flash jobs, at most one per serial port at a time
#[derive(Debug, Clone, Default)]
pub struct FlashOrchestrator {
    busy: Arc<Mutex<HashSet<String>>>,
}

impl FlashOrchestrator {
    /// Create an orchestrator with no ports in use
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `port` for one job
    pub fn lease(&self, port: &str) -> Result<PortLease, FlashError> {
        if !self.busy.lock().insert(port.to_string()) {
            return Err(FlashError::PortBusy(port.to_string()));
        }
        log::trace!("leased port {}", port);
        Ok(PortLease {
            port: port.to_string(),
            busy: Arc::clone(&self.busy),
        })
    }

    /// Whether a job currently owns `port`
    pub fn is_busy(&self, port: &str) -> bool {
        self.busy.lock().contains(port)
    }

    /// Run a job on the calling thread
    pub fn run<P, R>(
        &self,
        programmer: &mut P,
        port: &str,
        job: &FlashJob,
        options: &FlashOptions,
        reporter: &mut R,
    ) -> Result<FlashOutcome, FlashError>
    where
        P: ChipProgrammer,
        R: FlashReporter + ?Sized,
    {
        let _lease = self.lease(port)?;
        flash_sequence(programmer, port, job, options, reporter)
    }

    /// Run a job on a dedicated worker thread
    ///
    /// The port is claimed before the thread starts, so a busy port is
    /// reported here rather than through the task.
    pub fn spawn<P>(
        &self,
        mut programmer: P,
        port: String,
        job: FlashJob,
        options: FlashOptions,
    ) -> Result<FlashTask, FlashError>
    where
        P: ChipProgrammer + 'static,
    {
        let lease = self.lease(&port)?;
        let (event_tx, events) = mpsc::channel();
        let (outcome_tx, outcome) = mpsc::channel();

        let worker = thread::Builder::new()
            .name(format!("flash {}", port))
            .spawn(move || {
                let mut reporter = event_tx;
                let result = flash_sequence(&mut programmer, &port, &job, &options, &mut reporter);
                drop(lease);
                let _ = outcome_tx.send(result);
            })
            .map_err(|_| FlashError::WorkerLost)?;

        Ok(FlashTask {
            events,
            outcome,
            worker,
        })
    }
}

fn flash_sequence<P, R>(
    programmer: &mut P,
    port: &str,
    job: &FlashJob,
    options: &FlashOptions,
    reporter: &mut R,
) -> Result<FlashOutcome, FlashError>
where
    P: ChipProgrammer,
    R: FlashReporter + ?Sized,
{
    log::info!("Connecting to {}...", port);
    let mut chip = programmer
        .detect_chip(port, options.family)
        .map_err(|source| FlashError::ChipDetection {
            port: port.to_string(),
            source,
        })?;

    let info = chip.read_chip_info().map_err(FlashError::ChipInfo)?;
    log::info!("Chip Info:");
    for line in info.describe() {
        log::info!("{}", line);
    }
    reporter.report(FlashEvent::ChipDetected(info.clone()));

    log::info!("Running stub...");
    let mut stub = chip.run_stub().map_err(FlashError::StubFailed)?;
    reporter.report(FlashEvent::StubRunning);

    if options.upload_baud != ROM_BAUD {
        log::info!("Changing baud rate to {}", options.upload_baud);
        stub.change_baud(options.upload_baud)
            .map_err(|source| FlashError::BaudChangeFailed {
                baud: options.upload_baud,
                source,
            })?;
        reporter.report(FlashEvent::BaudChanged(options.upload_baud));
    }

    log::info!("Detecting flash size...");
    let flash_size = stub
        .detect_flash_size()
        .map_err(FlashError::FlashSizeDetection)?;
    log::info!("Detected flash size of {}", flash_size);
    reporter.report(FlashEvent::FlashSizeDetected(flash_size));

    let params = FlashParameters {
        size: flash_size,
        mode: job.mode(),
        frequency: job.frequency(),
    };
    log::info!(
        "Flash parameters: size={} mode={} freq={}",
        params.size,
        params.mode,
        params.frequency
    );
    stub.set_flash_parameters(&params)
        .map_err(FlashError::SetParameters)?;
    reporter.report(FlashEvent::ParametersSet(params));

    if options.no_erase {
        log::debug!("Skipping erase");
    } else {
        log::info!("Erasing flash (this may take a while)");
        reporter.report(FlashEvent::Erasing);
        stub.erase_flash().map_err(FlashError::EraseFailed)?;
    }

    let total = job.total_bytes();
    let mut written = 0;
    for chunk in job.chunks() {
        log::info!(
            "Writing {} ({} bytes) at 0x{:08X}",
            chunk.name,
            chunk.data.len(),
            chunk.offset
        );
        reporter.report(FlashEvent::Writing {
            offset: chunk.offset,
            name: chunk.name.clone(),
            len: chunk.data.len(),
        });
        stub.write_flash(chunk)
            .map_err(|source| FlashError::WriteFailed {
                offset: chunk.offset,
                source,
            })?;
        written += chunk.data.len();
        reporter.report(FlashEvent::Written { written, total });
    }

    log::info!("Hard resetting...");
    reporter.report(FlashEvent::Resetting);
    stub.hard_reset().map_err(FlashError::ResetFailed)?;

    if options.upload_baud != LOG_BAUD {
        stub.set_port_baud(LOG_BAUD)
            .map_err(FlashError::LogHandoff)?;
        thread::sleep(LOG_HANDOFF_DELAY);
        stub.clear_input().map_err(FlashError::LogHandoff)?;
    }
    let log_reader = stub.into_log_reader().map_err(FlashError::LogHandoff)?;

    log::info!("Done! Flashing is complete!");
    reporter.report(FlashEvent::Done);

    Ok(FlashOutcome {
        chip: info,
        flash_size,
        log_reader,
    })
}

//! Flash jobs and the device-programming sequence

mod job;
mod orchestrator;

pub use job::{FlashChunk, FlashFrequency, FlashJob, FlashMode, FlashParameters, FlashSize};
pub use orchestrator::{
    FlashEvent, FlashOptions, FlashOrchestrator, FlashOutcome, FlashReporter, FlashTask,
    PortLease, LOG_HANDOFF_DELAY,
};

//! fnflasher-dummy - In-memory ESP chip emulator for testing
//!
//! [`DummyProgrammer`] implements the programmer traits against an emulated
//! chip: flash contents live in memory, every call is recorded, and any step
//! can be told to fail. It's useful for testing and development without real
//! hardware.

use fnflasher_core::error::{DeviceError, DeviceResult};
use fnflasher_core::flash::{FlashChunk, FlashParameters, FlashSize};
use fnflasher_core::programmer::{
    ChipConnection, ChipFamily, ChipInfo, ChipProgrammer, Esp32Features, StubConnection,
};
use fnflasher_core::ROM_BAUD;
use parking_lot::Mutex;
use std::io::{Cursor, Read};
use std::sync::Arc;

/// Sector size the stub erases before writing
pub const SECTOR_SIZE: usize = 4096;

/// Step of the programmer protocol, used for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DummyStep {
    /// Chip detection
    Detect,
    /// Reading chip identity
    ReadChipInfo,
    /// Starting the stub
    RunStub,
    /// Changing the upload baud rate
    ChangeBaud,
    /// Flash size probe
    DetectFlashSize,
    /// Setting flash parameters
    SetFlashParameters,
    /// Full erase
    Erase,
    /// Writing the chunk at this offset
    Write(u32),
    /// Hard reset
    HardReset,
    /// Host side baud change
    SetPortBaud,
    /// Input flush
    ClearInput,
    /// Log reader handoff
    LogHandoff,
}

/// Call made against the emulated chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DummyCall {
    /// `detect_chip`
    Detect {
        /// Port name
        port: String,
        /// Requested family
        family: Option<ChipFamily>,
    },
    /// `read_chip_info`
    ReadChipInfo,
    /// `run_stub`
    RunStub,
    /// `change_baud`
    ChangeBaud(u32),
    /// `detect_flash_size`
    DetectFlashSize,
    /// `set_flash_parameters`
    SetFlashParameters(FlashParameters),
    /// `erase_flash`
    EraseFlash,
    /// `write_flash`
    WriteFlash {
        /// Chunk offset
        offset: u32,
        /// Chunk length
        len: usize,
    },
    /// `hard_reset`
    HardReset,
    /// `set_port_baud`
    SetPortBaud(u32),
    /// `clear_input`
    ClearInput,
    /// `into_log_reader`
    IntoLogReader,
}

/// Configuration for the emulated chip
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Identity reported by the chip
    pub chip: ChipInfo,
    /// Flash size reported by the stub
    pub flash_size: FlashSize,
    /// Step that fails, if any
    pub fail_at: Option<DummyStep>,
    /// Bytes the "firmware" prints after reset
    pub log_output: Vec<u8>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            chip: ChipInfo::Esp32 {
                model: "ESP32-D0WDQ6 (revision 1)".to_string(),
                mac: [0x24, 0x0A, 0xC4, 0x12, 0x34, 0x56],
                num_cores: 2,
                cpu_frequency_mhz: 240,
                features: Esp32Features::BLUETOOTH | Esp32Features::FACTORY_CALIBRATED_ADC,
            },
            flash_size: FlashSize(4 * 1024 * 1024),
            fail_at: None,
            log_output: b"ets Jun  8 2016 00:22:57\r\nFujiNet booting\r\n".to_vec(),
        }
    }
}

impl DummyConfig {
    /// Default ESP8266 configuration
    pub fn esp8266() -> Self {
        Self {
            chip: ChipInfo::Esp8266 {
                model: "ESP8266EX".to_string(),
                mac: [0x5C, 0xCF, 0x7F, 0x12, 0x34, 0x56],
                chip_id: 0x00123456,
            },
            flash_size: FlashSize(4 * 1024 * 1024),
            ..Self::default()
        }
    }

    /// Same configuration, failing at `step`
    pub fn failing_at(mut self, step: DummyStep) -> Self {
        self.fail_at = Some(step);
        self
    }
}

#[derive(Debug)]
struct DummyState {
    calls: Vec<DummyCall>,
    flash: Vec<u8>,
    host_baud: u32,
}

/// Shared view of the emulated chip
#[derive(Debug, Clone)]
pub struct DummyDevice {
    config: Arc<DummyConfig>,
    state: Arc<Mutex<DummyState>>,
}

impl DummyDevice {
    fn new(config: DummyConfig) -> Self {
        let size = config.flash_size.bytes() as usize;
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(DummyState {
                calls: Vec::new(),
                flash: vec![0xFF; size],
                host_baud: ROM_BAUD,
            })),
        }
    }

    /// Calls made so far, in order
    pub fn calls(&self) -> Vec<DummyCall> {
        self.state.lock().calls.clone()
    }

    /// Copy of `len` flash bytes at `offset`
    pub fn read(&self, offset: u32, len: usize) -> Vec<u8> {
        let state = self.state.lock();
        let start = (offset as usize).min(state.flash.len());
        let end = (start + len).min(state.flash.len());
        state.flash[start..end].to_vec()
    }

    /// Host side baud rate
    pub fn host_baud(&self) -> u32 {
        self.state.lock().host_baud
    }

    fn call(&self, call: DummyCall, step: DummyStep) -> DeviceResult<()> {
        log::trace!("dummy: {:?}", call);
        self.state.lock().calls.push(call);
        if self.config.fail_at == Some(step) {
            log::debug!("dummy: injected failure at {:?}", step);
            return Err(DeviceError::Protocol(format!("injected failure at {:?}", step)));
        }
        Ok(())
    }
}

/// Emulated programmer
#[derive(Debug, Clone)]
pub struct DummyProgrammer {
    device: DummyDevice,
}

impl DummyProgrammer {
    /// Create a programmer with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            device: DummyDevice::new(config),
        }
    }

    /// Create a programmer emulating a 4 MB ESP32
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Handle for inspecting the emulated chip
    pub fn device(&self) -> DummyDevice {
        self.device.clone()
    }
}

impl ChipProgrammer for DummyProgrammer {
    type Chip = DummyChip;

    fn detect_chip(
        &mut self,
        port: &str,
        family: Option<ChipFamily>,
    ) -> DeviceResult<Self::Chip> {
        self.device.call(
            DummyCall::Detect {
                port: port.to_string(),
                family,
            },
            DummyStep::Detect,
        )?;
        let found = self.device.config.chip.family();
        if family.is_some_and(|wanted| wanted != found) {
            return Err(DeviceError::Protocol(format!(
                "wrong chip type: found {}",
                found
            )));
        }
        Ok(DummyChip {
            device: self.device.clone(),
        })
    }
}

/// Emulated chip in ROM bootloader mode
#[derive(Debug)]
pub struct DummyChip {
    device: DummyDevice,
}

impl ChipConnection for DummyChip {
    type Stub = DummyStub;

    fn read_chip_info(&mut self) -> DeviceResult<ChipInfo> {
        self.device
            .call(DummyCall::ReadChipInfo, DummyStep::ReadChipInfo)?;
        Ok(self.device.config.chip.clone())
    }

    fn run_stub(self) -> DeviceResult<Self::Stub> {
        self.device.call(DummyCall::RunStub, DummyStep::RunStub)?;
        Ok(DummyStub {
            device: self.device,
        })
    }
}

/// Emulated chip running the stub
#[derive(Debug)]
pub struct DummyStub {
    device: DummyDevice,
}

impl StubConnection for DummyStub {
    fn change_baud(&mut self, baud: u32) -> DeviceResult<()> {
        self.device
            .call(DummyCall::ChangeBaud(baud), DummyStep::ChangeBaud)?;
        self.device.state.lock().host_baud = baud;
        Ok(())
    }

    fn detect_flash_size(&mut self) -> DeviceResult<FlashSize> {
        self.device
            .call(DummyCall::DetectFlashSize, DummyStep::DetectFlashSize)?;
        Ok(self.device.config.flash_size)
    }

    fn set_flash_parameters(&mut self, params: &FlashParameters) -> DeviceResult<()> {
        self.device.call(
            DummyCall::SetFlashParameters(*params),
            DummyStep::SetFlashParameters,
        )
    }

    fn erase_flash(&mut self) -> DeviceResult<()> {
        self.device.call(DummyCall::EraseFlash, DummyStep::Erase)?;
        self.device.state.lock().flash.fill(0xFF);
        Ok(())
    }

    fn write_flash(&mut self, chunk: &FlashChunk) -> DeviceResult<()> {
        self.device.call(
            DummyCall::WriteFlash {
                offset: chunk.offset,
                len: chunk.data.len(),
            },
            DummyStep::Write(chunk.offset),
        )?;

        let mut state = self.device.state.lock();
        let start = chunk.offset as usize;
        let end = start + chunk.data.len();
        if end > state.flash.len() {
            return Err(DeviceError::Protocol(format!(
                "write of {} bytes at 0x{:X} exceeds flash size",
                chunk.data.len(),
                chunk.offset
            )));
        }

        // The stub erases every sector it touches before programming it
        let sector_start = start - start % SECTOR_SIZE;
        let sector_end = end.div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
        let sector_end = sector_end.min(state.flash.len());
        state.flash[sector_start..sector_end].fill(0xFF);
        state.flash[start..end].copy_from_slice(&chunk.data);
        Ok(())
    }

    fn hard_reset(&mut self) -> DeviceResult<()> {
        self.device.call(DummyCall::HardReset, DummyStep::HardReset)
    }

    fn set_port_baud(&mut self, baud: u32) -> DeviceResult<()> {
        self.device
            .call(DummyCall::SetPortBaud(baud), DummyStep::SetPortBaud)?;
        self.device.state.lock().host_baud = baud;
        Ok(())
    }

    fn clear_input(&mut self) -> DeviceResult<()> {
        self.device.call(DummyCall::ClearInput, DummyStep::ClearInput)
    }

    fn into_log_reader(self) -> DeviceResult<Box<dyn Read + Send>> {
        self.device
            .call(DummyCall::IntoLogReader, DummyStep::LogHandoff)?;
        Ok(Box::new(Cursor::new(self.device.config.log_output.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fnflasher_core::error::FlashError;
    use fnflasher_core::flash::{
        FlashEvent, FlashFrequency, FlashJob, FlashMode, FlashOptions, FlashOrchestrator,
    };
    use fnflasher_core::{LOG_BAUD, ROM_BAUD};

    const PORT: &str = "/dev/ttyUSB0";

    fn chunk(offset: u32, name: &str, data: &[u8]) -> FlashChunk {
        FlashChunk {
            offset,
            name: name.to_string(),
            data: Bytes::copy_from_slice(data),
        }
    }

    fn job() -> FlashJob {
        FlashJob::new(
            vec![
                chunk(0x1000, "bootloader.bin", &[0xE9, 0x02, 0x02, 0x20, 0x11]),
                chunk(0x8000, "partitions.bin", &[0xAA, 0x50, 0x01]),
                chunk(0x10000, "firmware.bin", &[0xE9, 0x05, 0x02, 0x20, 0x42, 0x42]),
            ],
            FlashMode::Dio,
            FlashFrequency::Freq40M,
        )
        .unwrap()
    }

    fn run(config: DummyConfig, options: FlashOptions) -> (DummyDevice, Result<(), FlashError>) {
        let mut programmer = DummyProgrammer::new(config);
        let device = programmer.device();
        let mut events = Vec::new();
        let result = FlashOrchestrator::new()
            .run(&mut programmer, PORT, &job(), &options, &mut events)
            .map(|_| ());
        (device, result)
    }

    #[test]
    fn test_detect_and_read_info() {
        let mut programmer = DummyProgrammer::new(DummyConfig::esp8266());
        let mut chip = programmer.detect_chip(PORT, None).unwrap();
        let info = chip.read_chip_info().unwrap();
        assert_eq!(info.family(), ChipFamily::Esp8266);
    }

    #[test]
    fn test_write_erases_touched_sectors() {
        let mut programmer = DummyProgrammer::new_default();
        let device = programmer.device();
        let chip = programmer.detect_chip(PORT, None).unwrap();
        let mut stub = chip.run_stub().unwrap();
        device.state.lock().flash[0x1000..0x2000].fill(0x00);

        stub.write_flash(&chunk(0x1004, "x.bin", &[1, 2, 3])).unwrap();
        assert_eq!(device.read(0x1000, 8), [0xFF, 0xFF, 0xFF, 0xFF, 1, 2, 3, 0xFF]);
        assert!(device.read(0x1800, 16).iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_write_beyond_flash_fails() {
        let mut programmer = DummyProgrammer::new_default();
        let chip = programmer.detect_chip(PORT, None).unwrap();
        let mut stub = chip.run_stub().unwrap();
        assert!(stub
            .write_flash(&chunk(4 * 1024 * 1024 - 2, "x.bin", &[1, 2, 3]))
            .is_err());
    }

    #[test]
    fn test_sequence_order() {
        let mut programmer = DummyProgrammer::new_default();
        let device = programmer.device();
        let mut events = Vec::new();
        let outcome = FlashOrchestrator::new()
            .run(
                &mut programmer,
                PORT,
                &job(),
                &FlashOptions::default(),
                &mut events,
            )
            .unwrap();

        let params = FlashParameters {
            size: FlashSize(4 * 1024 * 1024),
            mode: FlashMode::Dio,
            frequency: FlashFrequency::Freq40M,
        };
        assert_eq!(
            device.calls(),
            vec![
                DummyCall::Detect {
                    port: PORT.to_string(),
                    family: None
                },
                DummyCall::ReadChipInfo,
                DummyCall::RunStub,
                DummyCall::ChangeBaud(460_800),
                DummyCall::DetectFlashSize,
                DummyCall::SetFlashParameters(params),
                DummyCall::EraseFlash,
                DummyCall::WriteFlash {
                    offset: 0x1000,
                    len: 5
                },
                DummyCall::WriteFlash {
                    offset: 0x8000,
                    len: 3
                },
                DummyCall::WriteFlash {
                    offset: 0x10000,
                    len: 6
                },
                DummyCall::HardReset,
                DummyCall::SetPortBaud(LOG_BAUD),
                DummyCall::ClearInput,
                DummyCall::IntoLogReader,
            ]
        );

        assert_eq!(device.read(0x10000, 6), [0xE9, 0x05, 0x02, 0x20, 0x42, 0x42]);
        assert_eq!(device.read(0x8000, 3), [0xAA, 0x50, 0x01]);
        assert_eq!(device.host_baud(), LOG_BAUD);
        assert_eq!(outcome.chip.family(), ChipFamily::Esp32);
        assert_eq!(outcome.flash_size, FlashSize(4 * 1024 * 1024));

        assert!(matches!(events.first(), Some(FlashEvent::ChipDetected(_))));
        assert_eq!(events.last(), Some(&FlashEvent::Done));
        assert!(events.contains(&FlashEvent::Written {
            written: 14,
            total: 14
        }));

        let mut log = String::new();
        let mut reader = outcome.log_reader;
        reader.read_to_string(&mut log).unwrap();
        assert!(log.contains("FujiNet booting"));
    }

    #[test]
    fn test_no_erase_skips_erase() {
        let options = FlashOptions {
            no_erase: true,
            ..FlashOptions::default()
        };
        let (device, result) = run(DummyConfig::default(), options);
        result.unwrap();
        assert!(!device.calls().contains(&DummyCall::EraseFlash));
    }

    #[test]
    fn test_rom_baud_skips_baud_change() {
        let options = FlashOptions {
            upload_baud: ROM_BAUD,
            ..FlashOptions::default()
        };
        let (device, result) = run(DummyConfig::default(), options);
        result.unwrap();
        let calls = device.calls();
        assert!(!calls
            .iter()
            .any(|c| matches!(c, DummyCall::ChangeBaud(_))));
        assert!(calls.contains(&DummyCall::SetPortBaud(LOG_BAUD)));
    }

    #[test]
    fn test_log_baud_upload_keeps_port_baud() {
        let options = FlashOptions {
            upload_baud: LOG_BAUD,
            ..FlashOptions::default()
        };
        let (device, result) = run(DummyConfig::default(), options);
        result.unwrap();
        let calls = device.calls();
        assert!(calls.contains(&DummyCall::ChangeBaud(LOG_BAUD)));
        assert!(!calls
            .iter()
            .any(|c| matches!(c, DummyCall::SetPortBaud(_) | DummyCall::ClearInput)));
        assert_eq!(calls.last(), Some(&DummyCall::IntoLogReader));
    }

    #[test]
    fn test_baud_failure() {
        let config = DummyConfig::default().failing_at(DummyStep::ChangeBaud);
        let (device, result) = run(config, FlashOptions::default());
        assert!(matches!(
            result,
            Err(FlashError::BaudChangeFailed { baud: 460_800, .. })
        ));
        assert_eq!(device.calls().last(), Some(&DummyCall::ChangeBaud(460_800)));
        assert!(!device.calls().contains(&DummyCall::DetectFlashSize));
    }

    #[test]
    fn test_write_failure_aborts_before_reset() {
        let config = DummyConfig::default().failing_at(DummyStep::Write(0x8000));
        let (device, result) = run(config, FlashOptions::default());
        assert!(matches!(
            result,
            Err(FlashError::WriteFailed { offset: 0x8000, .. })
        ));
        let calls = device.calls();
        assert!(!calls.contains(&DummyCall::HardReset));
        assert!(!calls.contains(&DummyCall::WriteFlash {
            offset: 0x10000,
            len: 6
        }));
    }

    #[test]
    fn test_step_failures_map_to_errors() {
        let cases: [(DummyStep, fn(&FlashError) -> bool); 5] = [
            (DummyStep::Detect, |e| {
                matches!(e, FlashError::ChipDetection { .. })
            }),
            (DummyStep::RunStub, |e| matches!(e, FlashError::StubFailed(_))),
            (DummyStep::Erase, |e| matches!(e, FlashError::EraseFailed(_))),
            (DummyStep::HardReset, |e| matches!(e, FlashError::ResetFailed(_))),
            (DummyStep::ClearInput, |e| matches!(e, FlashError::LogHandoff(_))),
        ];
        for (step, check) in cases {
            let (_, result) = run(
                DummyConfig::default().failing_at(step),
                FlashOptions::default(),
            );
            let err = result.unwrap_err();
            assert!(check(&err), "{:?} gave {:?}", step, err);
        }
    }

    #[test]
    fn test_wrong_family_is_detection_error() {
        let options = FlashOptions {
            family: Some(ChipFamily::Esp8266),
            ..FlashOptions::default()
        };
        let (device, result) = run(DummyConfig::default(), options);
        assert!(matches!(result, Err(FlashError::ChipDetection { .. })));
        assert_eq!(device.calls().len(), 1);
    }

    #[test]
    fn test_busy_port_rejected() {
        let orchestrator = FlashOrchestrator::new();
        let _lease = orchestrator.lease(PORT).unwrap();

        let mut programmer = DummyProgrammer::new_default();
        let device = programmer.device();
        let result = orchestrator.run(
            &mut programmer,
            PORT,
            &job(),
            &FlashOptions::default(),
            &mut Vec::new(),
        );
        assert!(matches!(result, Err(FlashError::PortBusy(_))));
        assert!(device.calls().is_empty());

        let spawned = orchestrator.spawn(
            DummyProgrammer::new_default(),
            PORT.to_string(),
            job(),
            FlashOptions::default(),
        );
        assert!(matches!(spawned, Err(FlashError::PortBusy(_))));
    }

    #[test]
    fn test_spawned_job_reports_events() {
        let orchestrator = FlashOrchestrator::new();
        let programmer = DummyProgrammer::new_default();
        let device = programmer.device();

        let task = orchestrator
            .spawn(programmer, PORT.to_string(), job(), FlashOptions::default())
            .unwrap();
        let events: Vec<_> = task.events().iter().collect();
        let outcome = task.wait().unwrap();

        assert_eq!(events.last(), Some(&FlashEvent::Done));
        assert_eq!(outcome.chip.family(), ChipFamily::Esp32);
        assert_eq!(device.calls().last(), Some(&DummyCall::IntoLogReader));
        assert!(!orchestrator.is_busy(PORT));
    }

    #[test]
    fn test_spawned_job_failure() {
        let orchestrator = FlashOrchestrator::new();
        let programmer =
            DummyProgrammer::new(DummyConfig::default().failing_at(DummyStep::DetectFlashSize));
        let task = orchestrator
            .spawn(programmer, PORT.to_string(), job(), FlashOptions::default())
            .unwrap();
        assert!(matches!(
            task.wait(),
            Err(FlashError::FlashSizeDetection(_))
        ));
        assert!(!orchestrator.is_busy(PORT));
    }
}

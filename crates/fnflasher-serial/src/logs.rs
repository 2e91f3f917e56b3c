//! Device log capture
//!
//! [`SerialLogSink`] reads lines from a byte stream and stamps each one with
//! the local time at which it was read. The sink is an iterator that ends
//! only when the stream reaches end of file or fails; read timeouts just
//! mean the device was quiet.

use crate::error::Result;
use crate::transport::SerialTransport;
use chrono::{DateTime, Local};
use fnflasher_core::LOG_BAUD;
use std::fmt;
use std::io::{BufRead, BufReader, ErrorKind, Read};

/// One line of device output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// When the line was read
    pub timestamp: DateTime<Local>,
    /// Line text without line terminators
    pub text: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

/// Line iterator over a device byte stream
pub struct SerialLogSink<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    finished: bool,
}

impl SerialLogSink<SerialTransport> {
    /// Open `port` at the log baud rate
    pub fn open(port: &str) -> Result<Self> {
        let mut transport = SerialTransport::open(port, LOG_BAUD)?;
        transport.clear_input()?;
        Ok(Self::new(transport))
    }
}

impl<R: Read> SerialLogSink<R> {
    /// Read log lines from `reader`
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
            finished: false,
        }
    }

    fn take_line(&mut self) -> LogLine {
        let text = String::from_utf8_lossy(&self.pending)
            .trim_end_matches(['\r', '\n'])
            .replace('\r', "");
        self.pending.clear();
        LogLine {
            timestamp: Local::now(),
            text,
        }
    }
}

impl<R: Read> Iterator for SerialLogSink<R> {
    type Item = LogLine;

    fn next(&mut self) -> Option<LogLine> {
        if self.finished {
            return None;
        }
        loop {
            match self.reader.read_until(b'\n', &mut self.pending) {
                Ok(0) => {
                    self.finished = true;
                    log::debug!("Log stream closed");
                    return (!self.pending.is_empty()).then(|| self.take_line());
                }
                Ok(_) if self.pending.ends_with(b"\n") => return Some(self.take_line()),
                Ok(_) => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(e) => {
                    self.finished = true;
                    log::error!("Serial port closed: {}", e);
                    return (!self.pending.is_empty()).then(|| self.take_line());
                }
            }
        }
    }
}

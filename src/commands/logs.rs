//! Log-only mode

use super::{resolve_port, CmdResult};
use fnflasher_serial::SerialLogSink;
use std::io::Read;

/// Print every line from `reader` until it closes
pub fn print_logs<R: Read>(reader: R) {
    for line in SerialLogSink::new(reader) {
        println!("{}", line);
    }
}

/// Show device logs at the log baud rate
pub async fn cmd_logs(port: Option<&str>) -> CmdResult {
    let port = resolve_port(port)?;
    tokio::task::spawn_blocking(move || -> CmdResult {
        let sink = SerialLogSink::open(&port)?;
        println!("Showing logs of {} (Ctrl-C to stop)", port);
        for line in sink {
            println!("{}", line);
        }
        Ok(())
    })
    .await?
}

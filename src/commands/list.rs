//! List commands implementation

use super::CmdResult;
use crate::programmers;

/// List all supported programmers
pub fn list_programmers() {
    print!("{}", programmers::programmer_help());
}

/// List attached serial ports
pub fn list_ports() -> CmdResult {
    let ports = fnflasher_serial::list_serial_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    println!("{:<24} Description", "Port");
    println!("{}", "-".repeat(60));
    for port in ports {
        println!("{:<24} {}", port.name, port.description);
    }
    Ok(())
}

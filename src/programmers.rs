//! Programmer registration and dispatch
//!
//! This module provides a centralized registry for all programmer backends,
//! with support for feature-gated inclusion and dynamic help text generation.

use crate::commands::{BoxError, CmdResult};
use fnflasher_core::programmer::ChipProgrammer;

/// Information about a programmer
pub struct ProgrammerInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
    /// Whether the backend talks to a serial port
    pub needs_port: bool,
}

/// Get information about all available programmers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        aliases: &["emulator"],
        description: "In-memory ESP32 emulator for testing",
        needs_port: false,
    });

    programmers
}

/// Generate help text listing all available programmers
pub fn programmer_help() -> String {
    let programmers = available_programmers();

    if programmers.is_empty() {
        return "No programmers available (recompile with programmer features enabled)".to_string();
    }

    let mut help = String::from("Available programmers:\n");
    for p in &programmers {
        help.push_str(&format!("  {:12} - {}\n", p.name, p.description));
    }
    help
}

/// Generate a short list of programmer names for CLI help
pub fn programmer_names_short() -> String {
    let programmers = available_programmers();
    let names: Vec<&str> = programmers.iter().map(|p| p.name).collect();
    names.join(", ")
}

/// Look up a programmer by name or alias
pub fn programmer_info(name: &str) -> CmdResult<ProgrammerInfo> {
    available_programmers()
        .into_iter()
        .find(|p| p.name == name || p.aliases.contains(&name))
        .ok_or_else(|| unknown_programmer_error(name))
}

/// Resolve a name or alias to the canonical programmer name
pub fn find_programmer(name: &str) -> Option<&'static str> {
    programmer_info(name).ok().map(|p| p.name)
}

/// Work to run with a concrete programmer backend
pub trait ProgrammerTask {
    /// Result of the work
    type Output;

    /// Run with `programmer`
    fn run<P: ChipProgrammer + 'static>(self, programmer: P) -> Self::Output;
}

/// Open the named programmer and hand it to `task`
#[allow(unused_variables)]
pub fn with_programmer<T>(name: &str, task: T) -> CmdResult<T::Output>
where
    T: ProgrammerTask,
{
    let Some(canonical_name) = find_programmer(name) else {
        return Err(unknown_programmer_error(name));
    };

    match canonical_name {
        #[cfg(feature = "dummy")]
        "dummy" => {
            log::info!("Using the dummy programmer, no hardware will be touched");
            Ok(task.run(fnflasher_dummy::DummyProgrammer::new_default()))
        }
        _ => Err(unknown_programmer_error(name)),
    }
}

fn unknown_programmer_error(name: &str) -> BoxError {
    format!("Unknown programmer: {}\n\n{}", name, programmer_help()).into()
}

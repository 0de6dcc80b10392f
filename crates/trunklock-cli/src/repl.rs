//! REPL – Read-Eval-Print Loop for the trunklock interactive shell.
//!
//! Supported slash-commands:
//!   /help                  – show this list
//!   /status                – read LockCurrentState of every compartment
//!   /open  <front|rear>    – write LockTargetState = unsecured
//!   /close <front|rear>    – write LockTargetState = secured
//!   /sleep                 – put the simulated vehicle to sleep
//!   /quit | /exit          – exit the CLI

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Runtime;
use tracing::warn;

use trunklock_hal::SimVehicle;
use trunklock_runtime::{Characteristic, LockMechanismService};
use trunklock_types::{BinaryState, CompartmentApiId};

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    Status,
    Set {
        compartment: CompartmentApiId,
        target: BinaryState,
    },
    Sleep,
    Quit,
}

/// Parse one input line.  Errors are user-facing messages.
pub fn parse_command(line: &str) -> Result<ReplCommand, String> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().ok_or_else(|| "empty command".to_string())?;
    let arg = parts.next();
    if parts.next().is_some() {
        return Err(format!("too many arguments for {cmd}"));
    }

    let set = |target: BinaryState| -> Result<ReplCommand, String> {
        let compartment = arg
            .ok_or_else(|| format!("{cmd} needs a compartment (front|rear)"))?
            .parse::<CompartmentApiId>()
            .map_err(|e| e.to_string())?;
        Ok(ReplCommand::Set {
            compartment,
            target,
        })
    };

    match cmd {
        "/help" => Ok(ReplCommand::Help),
        "/status" => Ok(ReplCommand::Status),
        "/open" => set(BinaryState::Unsecured),
        "/close" => set(BinaryState::Secured),
        "/sleep" => Ok(ReplCommand::Sleep),
        "/quit" | "/exit" => Ok(ReplCommand::Quit),
        other => Err(format!("Unknown command: '{other}'")),
    }
}

/// Entry point for the interactive REPL.
///
/// Protocol calls are driven on `runtime`; background actuations keep running
/// on its worker threads after each call returns.
pub fn run(
    runtime: &Runtime,
    services: &[LockMechanismService],
    vehicle: &Arc<SimVehicle>,
    shutdown: Arc<AtomicBool>,
) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {}", "Terminal error".red(), e);
            return;
        }
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let line = match editor.readline(&format!("{} ", "trunklock>".bold().cyan())) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = editor.add_history_entry(line) {
            warn!(error = %e, "failed to record history entry");
        }

        match parse_command(line) {
            Ok(ReplCommand::Help) => cmd_help(),
            Ok(ReplCommand::Status) => cmd_status(runtime, services),
            Ok(ReplCommand::Set {
                compartment,
                target,
            }) => cmd_set(runtime, services, compartment, target),
            Ok(ReplCommand::Sleep) => {
                vehicle.put_to_sleep();
                println!("  {}", "Vehicle is now asleep.".dimmed());
            }
            Ok(ReplCommand::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(msg) => {
                println!("{} Type {} for available commands.", msg.red(), "/help".bold());
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "trunklock Commands".bold().underline());
    println!("  {}               – read every compartment", "/status".bold().cyan());
    println!("  {}  – request unsecured (open)", "/open <front|rear>".bold().cyan());
    println!("  {} – request secured (close)", "/close <front|rear>".bold().cyan());
    println!("  {}                – put the simulated vehicle to sleep", "/sleep".bold().cyan());
    println!("  {}         – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_status(runtime: &Runtime, services: &[LockMechanismService]) {
    for service in services {
        let value = runtime.block_on(service.get(Characteristic::LockCurrentState));
        let label = match BinaryState::from_hap_value(value) {
            Ok(BinaryState::Unsecured) => "unsecured (open)".yellow(),
            Ok(BinaryState::Secured) => "secured (closed)".green(),
            Err(_) => "unknown".red(),
        };
        println!("  {:<24} {}", service.service_name().bold(), label);
    }
}

fn cmd_set(
    runtime: &Runtime,
    services: &[LockMechanismService],
    compartment: CompartmentApiId,
    target: BinaryState,
) {
    let Some(service) = services
        .iter()
        .find(|s| s.coordinator().descriptor().api_id == compartment)
    else {
        println!("{} {}", "No service for".red(), compartment.as_str());
        return;
    };

    match runtime.block_on(service.set(Characteristic::LockTargetState, target.hap_value())) {
        Ok(()) => println!(
            "  {} {} → {} {}",
            "✓".green(),
            service.service_name().bold(),
            target,
            "(actuating in background)".dimmed()
        ),
        Err(e) => println!("  {} {}: {}", "✗".red(), service.service_name().bold(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_open_and_close() {
        assert_eq!(
            parse_command("/open front"),
            Ok(ReplCommand::Set {
                compartment: CompartmentApiId::Front,
                target: BinaryState::Unsecured,
            })
        );
        assert_eq!(
            parse_command("  /close   trunk "),
            Ok(ReplCommand::Set {
                compartment: CompartmentApiId::Rear,
                target: BinaryState::Secured,
            })
        );
    }

    #[test]
    fn set_requires_a_known_compartment() {
        assert!(parse_command("/open").unwrap_err().contains("needs a compartment"));
        assert!(parse_command("/open glovebox").unwrap_err().contains("glovebox"));
        assert!(parse_command("/open front now").unwrap_err().contains("too many"));
    }

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse_command("/status"), Ok(ReplCommand::Status));
        assert_eq!(parse_command("/help"), Ok(ReplCommand::Help));
        assert_eq!(parse_command("/sleep"), Ok(ReplCommand::Sleep));
        assert_eq!(parse_command("/exit"), Ok(ReplCommand::Quit));
    }

    #[test]
    fn unknown_command_is_reported() {
        assert!(parse_command("/unlock").unwrap_err().contains("/unlock"));
    }
}

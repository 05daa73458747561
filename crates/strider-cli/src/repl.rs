//! REPL – interactive operator shell for the estop supervisor.
//!
//! Supported slash-commands:
//!   /help          – show this list
//!   /status        – arbiter state, estop flag, fault flag
//!   /controllers   – list registered controllers
//!   /select <name> – request activation of a controller
//!   /stop          – assert the software estop
//!   /clear         – clear the software estop
//!   /reset         – acknowledge a latched recovery fault
//!   /quit | /exit  – exit the supervisor

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strider_supervisor::{ArbiterCommand, ArbiterEvent, ArbiterHandle, SupervisorState};
use strider_types::{ControllerKind, SafetyEvent};

/// Everything the REPL needs from the wired-up supervisor.
pub struct ReplContext {
    pub handle: ArbiterHandle,
    /// `(name, kind)` snapshot of the registry, for display only.
    pub controllers: Vec<(String, ControllerKind)>,
    pub shutdown: Arc<AtomicBool>,
}

/// Entry point for the interactive REPL.  Runs on a blocking thread;
/// `shutdown` is polled each iteration so a Ctrl-C exit is honoured.
pub fn run(ctx: ReplContext) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "strider>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }

        let mut parts = cmd.split_whitespace();
        match parts.next().unwrap_or_default() {
            "/help" => cmd_help(),
            "/status" => cmd_status(&ctx),
            "/controllers" => cmd_controllers(&ctx),
            "/select" => match parts.next() {
                Some(name) => {
                    send(
                        &ctx,
                        ArbiterEvent::Command(ArbiterCommand::Select {
                            target: name.to_string(),
                        }),
                    );
                    println!("  switch to '{}' requested", name.bold());
                }
                None => println!("{}", "Usage: /select <controller>".yellow()),
            },
            "/stop" => {
                send(&ctx, ArbiterEvent::Safety(SafetyEvent::EstopAsserted));
                println!("{}", "  estop asserted".red().bold());
            }
            "/clear" => {
                send(&ctx, ArbiterEvent::Safety(SafetyEvent::EstopCleared));
                println!("  estop clear requested (controller stays safe until /select)");
            }
            "/reset" => {
                send(&ctx, ArbiterEvent::Command(ArbiterCommand::ClearFault));
                println!("  fault reset requested");
            }
            "/quit" | "/exit" => {
                println!("{}", "Goodbye.".green());
                ctx.shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

fn send(ctx: &ReplContext, event: ArbiterEvent) {
    if let Err(e) = ctx.handle.event_sender().blocking_send(event) {
        eprintln!("{}: {}", "Failed to reach arbiter".red(), e);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Strider Commands".bold().underline());
    println!("  {}          – arbiter state, estop flag, fault flag", "/status".bold().cyan());
    println!("  {}     – list registered controllers", "/controllers".bold().cyan());
    println!("  {}  – request activation of a controller", "/select <name>".bold().cyan());
    println!("  {}            – assert the software estop", "/stop".bold().cyan());
    println!("  {}           – clear the software estop", "/clear".bold().cyan());
    println!("  {}           – acknowledge a latched recovery fault", "/reset".bold().cyan());
    println!("  {}     – exit the supervisor", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_status(ctx: &ReplContext) {
    let status = ctx.handle.status();
    println!();
    println!("  state   : {}", status.state.to_string().bold());
    println!(
        "  estop   : {}",
        if status.estop_asserted {
            "ASSERTED".red().bold()
        } else {
            "clear".green()
        }
    );
    println!(
        "  fault   : {}",
        if status.faulted {
            "LATCHED (use /reset)".red().bold()
        } else {
            "none".green()
        }
    );
    println!();
}

fn cmd_controllers(ctx: &ReplContext) {
    let status = ctx.handle.status();
    let switching = matches!(status.state, SupervisorState::Switching { .. });
    println!();
    println!("{}", "Registered controllers".bold().underline());
    for (name, kind) in &ctx.controllers {
        let tag = match kind {
            ControllerKind::Safe => "safe".green(),
            ControllerKind::Commanding => "commanding".cyan(),
        };
        let marker = if !switching && *name == status.active_controller {
            "● ".green().to_string()
        } else {
            "  ".to_string()
        };
        println!("  {}{} ({})", marker, name.bold(), tag);
    }
    println!();
}

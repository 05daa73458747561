//! `strider` – emergency-stop supervisor for a legged robot's learned
//! locomotion controllers.
//!
//! This binary is the deployment entry point.  It:
//!
//! 1. Loads `~/.strider/config.toml` (writing defaults on first run).
//! 2. Builds the controller registry and the selected switching transport
//!    (in-process sim or rosbridge).
//! 3. Spawns the switch arbiter and the safety-input monitor.
//! 4. Intercepts **Ctrl-C** to assert the estop before exiting.
//! 5. Drops the operator into an interactive REPL (`/select`, `/stop`,
//!    `/clear`, `/reset`, `/status`).

mod config;
mod repl;
mod telemetry;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use strider_input::{GamepadSource, InputMonitor, ScriptedSource};
use strider_supervisor::{Arbiter, ArbiterEvent, ControllerRegistry, StatusBus};
use strider_transport::{RosbridgeTransport, SimTransport};
use strider_types::{ControllerKind, SafetyEvent, StatusPayload};

use crate::config::{Config, InputChoice, TransportChoice};

fn main() -> ExitCode {
    // Tracing first: the simple OTLP exporter needs no running runtime, so
    // initialisation happens before Tokio starts.
    let _guard = telemetry::init_tracing("strider");

    print_banner();
    let cfg = load_config();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(cfg))
}

async fn run(cfg: Config) -> ExitCode {
    // ── Controller registry ───────────────────────────────────────────────
    let registry = match ControllerRegistry::from_descriptors(cfg.descriptors()) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("{}: {}", "Invalid controller configuration".red(), e);
            return ExitCode::FAILURE;
        }
    };
    let mut controllers: Vec<(String, ControllerKind)> = registry
        .all()
        .map(|desc| (desc.name.clone(), desc.kind))
        .collect();
    controllers.sort_by(|a, b| a.0.cmp(&b.0));

    // ── Status bus + operator-facing alert printer ────────────────────────
    let status_bus = StatusBus::default();
    spawn_alert_printer(&status_bus);

    // ── Arbiter on the configured transport ───────────────────────────────
    let arbiter_config = cfg.recovery.arbiter_config();
    let handle = match cfg.transport {
        TransportChoice::Sim => {
            info!("using simulated switching transport (dry run)");
            let mut sim = SimTransport::new();
            for (name, kind) in &controllers {
                sim = match kind {
                    ControllerKind::Safe => sim.with_safe(name.clone()),
                    ControllerKind::Commanding => sim.with_commanding(name.clone()),
                };
            }
            Arbiter::spawn(registry, sim, status_bus.clone(), arbiter_config)
        }
        TransportChoice::Rosbridge => {
            info!(url = %cfg.rosbridge_url, "using rosbridge switching transport");
            let transport = RosbridgeTransport::new(&cfg.rosbridge_url);
            Arbiter::spawn(registry, transport, status_bus.clone(), arbiter_config)
        }
    };

    // ── Safety input monitor ──────────────────────────────────────────────
    let (safety_tx, mut safety_rx) = mpsc::channel(64);
    let monitor_config = cfg.input.monitor_config();
    let _monitor = match cfg.input.device {
        InputChoice::Gamepad => match GamepadSource::from_button_name(&cfg.input.button) {
            Ok(source) => Some(InputMonitor::spawn(source, monitor_config, safety_tx.clone())),
            Err(e) => {
                // Loss of the safety channel is treated as a stop request.
                error!(error = %e, "safety input init failed; asserting estop");
                let _ = safety_tx.send(SafetyEvent::EstopAsserted).await;
                None
            }
        },
        InputChoice::Sim => {
            info!("using simulated safety input; estop is driven from the REPL");
            Some(InputMonitor::spawn(
                ScriptedSource::idle_at(false),
                monitor_config,
                safety_tx.clone(),
            ))
        }
    };

    // Forward debounced safety events into the arbiter's event channel.
    {
        let events = handle.event_sender();
        tokio::spawn(async move {
            while let Some(event) = safety_rx.recv().await {
                if events.send(ArbiterEvent::Safety(event)).await.is_err() {
                    break;
                }
            }
        });
    }

    // ── Ctrl-C: assert estop, then shut down ──────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let events = handle.event_sender();
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!(
                "{}",
                "⚠  Ctrl-C received – asserting estop and shutting down …"
                    .yellow()
                    .bold()
            );
            let _ = events.blocking_send(ArbiterEvent::Safety(SafetyEvent::EstopAsserted));
            shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    // ── Operator REPL ─────────────────────────────────────────────────────
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());
    let repl_ctx = repl::ReplContext {
        handle: handle.clone(),
        controllers,
        shutdown,
    };
    if tokio::task::spawn_blocking(move || repl::run(repl_ctx))
        .await
        .is_err()
    {
        error!("REPL task panicked");
        return ExitCode::FAILURE;
    }

    info!("supervisor exiting");
    ExitCode::SUCCESS
}

/// Print fatal alerts and fault-clear notices to the operator terminal.
/// Everything else on the bus is already logged by the arbiter.
fn spawn_alert_printer(bus: &StatusBus) {
    let mut records = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match records.recv().await {
                Ok(event) => match event.payload {
                    StatusPayload::FatalAlert { details } => {
                        println!();
                        println!("{} {}", "FATAL:".red().bold(), details.red());
                        println!("{}", "  Mode selection is locked until /reset.".red());
                    }
                    StatusPayload::FaultCleared => {
                        println!(
                            "{}",
                            "  fault cleared; mode selection available again".green()
                        );
                    }
                    _ => {}
                },
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn load_config() -> Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  First run: default config written to {}",
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Could not write default config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   _____ __       _     __         "#.bold().cyan());
    println!("{}", r#"  / ___// /______(_)___/ /__  _____"#.bold().cyan());
    println!("{}", r#"  \__ \/ __/ ___/ / __  / _ \/ ___/"#.bold().cyan());
    println!("{}", r#" ___/ / /_/ /  / / /_/ /  __/ /    "#.bold().cyan());
    println!("{}", r#"/____/\__/_/  /_/\__,_/\___/_/     "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Strider".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Locomotion Estop Supervisor");
    println!();
}

//! `trunklock-cli` – trunklock Command Line Interface
//!
//! Runs both trunk compartments of a simulated vehicle behind lock-style
//! services.  It:
//!
//! 1. Loads `~/.trunklock/config.toml`, writing the defaults on first run.
//! 2. Initialises tracing (optionally exporting spans over OTLP).
//! 3. Wires a [`SimVehicle`], one [`ActuationCoordinator`] per compartment and
//!    a bus listener that prints every pushed state.
//! 4. Drops the user into an interactive REPL.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use trunklock_hal::{SimVehicle, VehicleApi};
use trunklock_middleware::{BusStateSink, EventBus, StateSink, Topic, TopicReceiver};
use trunklock_runtime::{
    ActuationCoordinator, CoordinatorConfig, LockMechanismService, init_tracing,
};
use trunklock_types::{ActuationOutcome, ActuatorDescriptor, EventPayload};

fn main() {
    let tracing_guard = init_tracing("trunklock");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  First run: default config written to {}",
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Could not save config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    info!(config = ?cfg, otlp = tracing_guard.is_exporting(), "configuration resolved");

    // The runtime is built after tracing so the OTLP exporter stays synchronous.
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    // ── Wiring ────────────────────────────────────────────────────────────
    let mut vehicle = SimVehicle::new()
        .with_latency(cfg.sim_latency())
        .with_access_token(cfg.access_token.clone());
    if cfg.sim_starts_asleep {
        vehicle = vehicle.asleep();
    }
    let vehicle = Arc::new(vehicle);
    let api: Arc<dyn VehicleApi> = vehicle.clone();

    let bus = Arc::new(EventBus::default());
    let sink: Arc<dyn StateSink> = Arc::new(BusStateSink::new(Arc::clone(&bus)));
    let coordinator_config = CoordinatorConfig {
        debounce: cfg.debounce(),
        remote_call_timeout: cfg.remote_call_timeout(),
    };

    let services: Vec<LockMechanismService> = ActuatorDescriptor::ALL
        .iter()
        .map(|descriptor| {
            let coordinator = ActuationCoordinator::new(
                *descriptor,
                Arc::clone(&api),
                Arc::clone(&sink),
                coordinator_config,
            );
            LockMechanismService::new(&cfg.vehicle_name, Arc::new(coordinator))
        })
        .collect();

    println!();
    for service in &services {
        println!(
            "  {} {} ({})",
            "•".cyan(),
            service.service_name().bold(),
            service.subtype().dimmed()
        );
    }
    println!("  Type {} for available commands.", "/help".bold());
    println!();

    runtime.spawn(watch_bus(
        bus.subscribe_to(Topic::StateUpdates),
        bus.subscribe_to(Topic::Actuation),
    ));

    repl::run(&runtime, &services, &vehicle, shutdown);

    // In-flight actuations are abandoned with the runtime.
    runtime.shutdown_background();
    drop(tracing_guard);
}

/// Print every pushed state and actuation outcome as it arrives.
async fn watch_bus(mut updates: TopicReceiver, mut actuations: TopicReceiver) {
    loop {
        tokio::select! {
            event = updates.recv() => {
                let Some(event) = event else { break };
                if let EventPayload::CurrentStateAssumed { subtype, state } = event.payload {
                    println!(
                        "\n  {} {} current state → {} {}",
                        "⇢".cyan(),
                        subtype.bold(),
                        state.state(),
                        "(assumed)".dimmed()
                    );
                }
            }
            event = actuations.recv() => {
                let Some(event) = event else { break };
                if let EventPayload::ActuationFinished { subtype, opening, outcome } = event.payload {
                    let direction = if opening { "open" } else { "close" };
                    let verdict = match outcome {
                        ActuationOutcome::Skipped => "already there, skipped".dimmed(),
                        ActuationOutcome::Actuated => "actuated".green(),
                        ActuationOutcome::Failed { stage, reason } => {
                            format!("failed at {stage}: {reason}").red()
                        }
                        ActuationOutcome::TimedOut { stage } => {
                            format!("timed out at {stage}").red()
                        }
                    };
                    println!("\n  {} {} {} → {}", "⚙".cyan(), subtype.bold(), direction, verdict);
                }
            }
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", "  ╔══════════════════════════════╗".cyan());
    println!("{}", "  ║   trunklock · trunk latches  ║".cyan().bold());
    println!("{}", "  ╚══════════════════════════════╝".cyan());
    println!();
}

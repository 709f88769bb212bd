use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::core::{
    alerts::{
        catalog::CatalogStore, engine::AlertEngine, model::Channel, registry::EvaluatorRegistry,
        selector::OutputSnapshot,
    },
    config::ConfigManager,
    coordinator::Coordinator,
    replay_engine::{self, ReplayController},
};

const USAGE: &str = "usage: dash-alerts <trace.jsonl> [config-dir]";

fn init_logging() {
    // Stdout carries the snapshots, so logs go to stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .try_init();
}

/// Replay a recorded signal trace through the alert engine and print every
/// snapshot that changed as one JSON line.
pub fn run() -> ExitCode {
    init_logging();

    let mut args = std::env::args().skip(1);
    let Some(trace_path) = args.next().map(PathBuf::from) else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };
    let config_dir = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    let config_manager = ConfigManager::new(config_dir);
    let settings = config_manager.load();
    let catalog = CatalogStore::new(config_manager.catalog_path(&settings)).load_or_default();

    let frames = match replay_engine::read_trace(&trace_path) {
        Ok(frames) => frames,
        Err(e) => {
            log::error!("Failed to read trace {}: {}", trace_path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    log::info!("Replaying {} frames from {}", frames.len(), trace_path.display());

    // Run long enough after the last frame for every timer to play out.
    let tail = catalog
        .iter()
        .map(|rule| rule.persistence_delay().max(rule.min_on_time()))
        .max()
        .unwrap_or(Duration::ZERO)
        .max(settings.engine.clear_all_pulse());

    let engine = AlertEngine::new(catalog, EvaluatorRegistry::builtin(), settings.engine.clone());
    let mut coordinator = Coordinator::new(engine);
    let controller = ReplayController::new(frames, settings.tick_interval()).with_tail(tail);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for tick in controller {
        for at in &tick.cancel_presses {
            let output = coordinator.cancel_pressed(*at);
            if output.changed {
                if let Err(e) = print_snapshot(&mut out, *at, &output.snapshot) {
                    log::error!("Failed to write snapshot: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        let output = coordinator.tick(&tick.signals, tick.now);
        if output.changed {
            if let Err(e) = print_snapshot(&mut out, tick.now, &output.snapshot) {
                log::error!("Failed to write snapshot: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn print_snapshot(
    out: &mut impl Write,
    at: Duration,
    snapshot: &OutputSnapshot,
) -> io::Result<()> {
    for channel in Channel::all() {
        if let Some(msg) = snapshot.channel(*channel) {
            log::debug!("{:?} at {}ms: {} ({})", channel, at.as_millis(), msg.rule_id, msg.priority);
        }
    }
    let line = serde_json::json!({
        "at_ms": at.as_millis() as u64,
        "snapshot": snapshot,
    });
    writeln!(out, "{}", line)
}

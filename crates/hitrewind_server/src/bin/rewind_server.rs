//! # HITREWIND Demo Server
//!
//! Runs a scenario in real time and reports how many shots hit what their
//! shooters were aiming at.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=hitrewind_core=debug rewind_server --config scenario.toml --duration 10
//! rewind_server --no-compensation
//! ```

use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, TrySendError};
use hitrewind_core::{FixedStepLoop, VolumeQueryEngine};
use hitrewind_server::{
    shot_channel, LaggedClient, ScenarioConfig, ServerError, ServerResult, ShotSender, ShotStats,
    Simulation, WorldView,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Views buffered toward the client thread.
const VIEW_QUEUE_CAPACITY: usize = 64;

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match parse_args() {
        Ok(Some(config)) => config,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            error!(%e, "bad arguments");
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(stats) => {
            info!(
                received = stats.received,
                hits = stats.hits,
                intended = stats.intended_hits,
                misses = stats.misses,
                rejected = stats.rejected,
                accuracy = stats.accuracy(),
                "run complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(%e, "server stopped");
            ExitCode::FAILURE
        }
    }
}

/// Reads `--config`, `--duration` and `--no-compensation`.
fn parse_args() -> ServerResult<Option<ScenarioConfig>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config = ScenarioConfig::default();
    let mut duration = None;
    let mut no_compensation = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                let path = args
                    .get(i + 1)
                    .ok_or_else(|| ServerError::InvalidScenario("--config needs a path".into()))?;
                config = ScenarioConfig::load(path)?;
                i += 1;
            }
            "--duration" | "-d" => {
                let secs = args.get(i + 1).and_then(|s| s.parse().ok()).ok_or_else(|| {
                    ServerError::InvalidScenario("--duration needs whole seconds".into())
                })?;
                duration = Some(secs);
                i += 1;
            }
            "--no-compensation" => no_compensation = true,
            "--help" | "-h" => {
                println!("Usage: rewind_server [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>      Scenario TOML file");
                println!("  -d, --duration <SECS>    Run length, 0 runs until killed");
                println!("      --no-compensation    Resolve shots on live poses");
                println!("  -h, --help               Show this help");
                return Ok(None);
            }
            other => {
                return Err(ServerError::InvalidScenario(format!("unknown argument {other}")));
            }
        }
        i += 1;
    }

    // Command-line flags win over the file
    if let Some(secs) = duration {
        config.duration_secs = secs;
    }
    if no_compensation {
        config.lag_compensation = false;
    }
    config.validate()?;
    Ok(Some(config))
}

fn run(config: &ScenarioConfig) -> ServerResult<ShotStats> {
    let mut sim = Simulation::new(config)?;
    let (shots, mut resolver) = shot_channel(config.shot_queue_capacity, config.lag_compensation);
    let (views, view_rx) = bounded::<WorldView>(VIEW_QUEUE_CAPACITY);

    let client = LaggedClient::from_scenario(config);
    info!(
        delay_frames = client.delay(),
        lag_compensation = config.lag_compensation,
        "client connected"
    );
    let client_thread = thread::Builder::new()
        .name("lagged-client".into())
        .spawn(move || client_loop(client, &view_rx, &shots))
        .map_err(|e| ServerError::Thread(format!("{e}")))?;

    let deadline = (config.duration_secs > 0)
        .then(|| Instant::now() + Duration::from_secs(u64::from(config.duration_secs)));
    let report_every = u64::from(config.rewind.tick_rate) * 5;
    let mut driver = FixedStepLoop::new(config.rewind.tick_rate);
    let mut engine = VolumeQueryEngine::new();

    while deadline.map_or(true, |d| Instant::now() < d) {
        for _ in 0..driver.due_steps() {
            let started = Instant::now();

            resolver.drain(sim.coordinator_mut(), &mut engine);
            let frame = sim.step()?;
            match views.try_send(sim.view()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => warn!(frame, "client lagging, view dropped"),
                Err(TrySendError::Disconnected(_)) => {
                    return Err(ServerError::Disconnected("client thread"));
                }
            }

            driver.record_step(started);
            if frame % report_every == 0 {
                let timing = driver.stats();
                info!(
                    frame,
                    avg_step_us = timing.avg_step_us,
                    max_step_us = timing.max_step_us,
                    overruns = timing.overruns,
                    shots = resolver.stats().received,
                    accuracy = resolver.stats().accuracy(),
                    "progress"
                );
            }
        }
        driver.sleep_until_next();
    }

    drop(views);
    let (fired, dropped) = client_thread
        .join()
        .map_err(|_| ServerError::Disconnected("client thread panicked"))?;
    resolver.drain(sim.coordinator_mut(), &mut engine);

    let rewind = sim.coordinator().stats();
    info!(
        frames = rewind.frames,
        windows = rewind.windows_opened,
        rejected_windows = rewind.windows_rejected,
        entities_rewound = rewind.entities_rewound,
        forward_recoveries = rewind.forward_recoveries,
        fired,
        dropped,
        "rewind engine totals"
    );
    Ok(*resolver.stats())
}

/// Client thread body; returns shots fired and shots dropped.
fn client_loop(
    mut client: LaggedClient,
    views: &Receiver<WorldView>,
    shots: &ShotSender,
) -> (u64, u64) {
    let mut dropped = 0;
    for view in views {
        for shot in client.observe(view) {
            match shots.send(shot) {
                Ok(true) => {}
                Ok(false) => dropped += 1,
                Err(_) => return (client.fired(), dropped),
            }
        }
    }
    (client.fired(), dropped)
}

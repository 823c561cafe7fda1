mod clock;
mod db;
mod settings;
mod sink;
mod state;
mod web;

use anyhow::Result;
use greenhouse_core::config;
use greenhouse_core::{ControllerConfig, IrrigationController};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use clock::SimClock;
use db::Db;
use settings::Settings;
use sink::{spawn_file_writer, spawn_store_writer, FanOut, HostSink};
use state::Simulation;
use web::AppState;

/// Lines queued for each writer task before its sink starts reporting
/// `Full`.
const STORE_QUEUE: usize = 256;
const FILE_QUEUE: usize = 256;

fn main() -> Result<()> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // ── Env config ──────────────────────────────────────────────────
    // Read while the process is still single-threaded: the local UTC offset
    // behind the default start time is only available then.
    let settings = Settings::from_env()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(settings))
}

async fn run(settings: Settings) -> Result<()> {
    // ── Controller config ───────────────────────────────────────────
    let cfg = if Path::new(&settings.config_path).exists() {
        config::load(&settings.config_path)?
    } else {
        warn!(path = %settings.config_path, "config file not found, using defaults");
        ControllerConfig::default()
    };
    info!(
        min = cfg.humidity.min_percent,
        max = cfg.humidity.max_percent,
        record_every_min = cfg.recording.interval_min,
        "controller config loaded"
    );

    // ── Observation sinks ───────────────────────────────────────────
    let mut sinks = FanOut::default();
    if let Some(path) = &settings.log_path {
        let (file, _writer) = spawn_file_writer(path, FILE_QUEUE);
        sinks.push(Box::new(file));
        info!(path = %path, "text log enabled");
    }

    let db = match &settings.db_url {
        Some(url) => {
            let db = Db::connect(url).await?;
            db.migrate().await?;
            let stored = db.count_observations().await?;
            info!(url = %url, stored, "observation store ready");

            let (store, _writer) = spawn_store_writer(db.clone(), STORE_QUEUE);
            sinks.push(Box::new(store));
            Some(db)
        }
        None => None,
    };
    if sinks.is_empty() {
        warn!("no observation sinks configured; records stay in memory only");
    }

    // ── Shared simulation ───────────────────────────────────────────
    let controller = IrrigationController::new(cfg, Box::new(sinks) as HostSink);
    let clock = SimClock::new(settings.start, settings.speed);
    let shared = Arc::new(RwLock::new(Simulation::new(controller, clock, Instant::now())));
    {
        let mut sim = shared.write().await;
        sim.record_system(format!("simulator started at {}x", settings.speed));
    }

    // ── Web server ──────────────────────────────────────────────────
    let web_state = AppState {
        sim: Arc::clone(&shared),
        db,
    };
    let port = settings.web_port;
    tokio::spawn(async move {
        if let Err(e) = web::serve(web_state, port).await {
            error!("{e:#}");
        }
    });

    // ── Clock driver ────────────────────────────────────────────────
    tokio::select! {
        _ = clock::drive(Arc::clone(&shared), settings.tick) => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!("failed to listen for ctrl-c: {e}");
            }
            let sim = shared.read().await;
            info!(
                sim_time = %state::format_sim_time(sim.clock.now()),
                water_l = format!("{:.2}", sim.controller.water_used_liters()),
                fertilizer_ml = format!("{:.2}", sim.controller.fertilizer_used_ml()),
                "shutting down"
            );
        }
    }

    Ok(())
}

//! Headless simulation that drives the sampling layer along a descending
//! camera path over a synthetic tile pyramid.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p quadpager-demo -- --steps 60 --max-tiles 64`.

mod delegates;
mod scene;
mod source;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::{DVec2, DVec3, UVec2};
use quadpager_config::{CliArgs, Config, DemoConfig};
use quadpager_lod::{SamplingParams, ViewState};
use quadpager_sampler::{ChangeSet, SamplerError, SamplingLayer, SchedulerStats, ThreadPoolFetcher};
use quadpager_tile::{CoordSystem, Mbr};
use tracing::{debug, error, info};

use delegates::{EventCounts, EventLogger, OfflineCompositor};
use scene::Scene;
use source::SyntheticSource;

/// Upper bound on scheduling passes per camera position.
const MAX_TICKS_PER_STEP: u32 = 200;

/// Wait between passes while fetches are outstanding.
const TICK: Duration = Duration::from_millis(1);

const VIEWPORT: UVec2 = UVec2::new(1280, 720);

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    #[error("failed to start fetch workers: {0}")]
    Workers(#[from] std::io::Error),
}

/// Camera sweeping across the unit plane while descending geometrically.
struct CameraPath {
    steps: u32,
    start_height: f64,
    end_height: f64,
}

impl CameraPath {
    fn new(demo: &DemoConfig) -> Self {
        Self {
            steps: demo.steps.max(1),
            start_height: demo.start_height.max(1e-6),
            end_height: demo.end_height.max(1e-6),
        }
    }

    fn view_at(&self, step: u32) -> ViewState {
        let t = if self.steps > 1 {
            f64::from(step) / f64::from(self.steps - 1)
        } else {
            0.0
        };
        let height = self.start_height * (self.end_height / self.start_height).powf(t);
        let ground = DVec3::new(
            0.3 + 0.4 * t,
            0.5 + 0.15 * (t * std::f64::consts::PI).sin(),
            0.0,
        );
        // Tilted slightly so nearer tiles refine deeper than far ones.
        let eye = ground + DVec3::new(0.0, -0.4 * height, height);
        ViewState::look_at(eye, ground, DVec3::Z, 0.9, VIEWPORT)
    }
}

struct Summary {
    steps: u32,
    elapsed: Duration,
    stats: SchedulerStats,
    events: EventCounts,
    composed: usize,
    peak_resident: usize,
    scene_tiles: usize,
    scene_bytes: usize,
    changes_applied: u64,
}

fn sampling_params(config: &Config) -> SamplingParams {
    let sampling = &config.sampling;
    SamplingParams {
        min_zoom: sampling.min_zoom,
        max_zoom: sampling.max_zoom,
        num_frames: sampling.image_depth,
        single_level: sampling.single_level,
        importance_scale: sampling.importance_scale,
        max_tiles: sampling.max_tiles,
        simultaneous_fetches: config.fetch.simultaneous_fetches,
        min_importance: sampling.min_importance,
        tile_size: sampling.tile_size,
        near_completion: sampling.near_completion,
        multi_level_loads: sampling.multi_level_loads.clone(),
        ..Default::default()
    }
}

fn run(config: &Config) -> Result<Summary, DemoError> {
    let params = sampling_params(config);
    let source = SyntheticSource::new(&config.demo, params.min_zoom, params.max_zoom, params.tile_size);
    let fetcher = match config.fetch.worker_threads {
        0 => ThreadPoolFetcher::with_defaults(source)?,
        threads => ThreadPoolFetcher::new(source, threads)?,
    };

    let mut layer = SamplingLayer::for_source(params, fetcher)?;
    let (min_zoom, max_zoom) = (layer.params().min_zoom, layer.params().max_zoom);
    layer.initialise(CoordSystem::unit())?;
    layer.start_layer(Mbr::new(DVec2::ZERO, DVec2::ONE), min_zoom, max_zoom)?;

    let logger = Arc::new(EventLogger::new(config.debug.log_tile_events));
    let compositor = Arc::new(OfflineCompositor::new());
    layer.add_builder_delegate(logger.clone())?;
    layer.add_builder_delegate(compositor.clone())?;

    let path = CameraPath::new(&config.demo);
    let mut scene = Scene::default();
    let mut changes = ChangeSet::new();
    let mut peak_resident = 0;
    let started = Instant::now();

    for step in 0..path.steps {
        layer.view_update(&path.view_at(step))?;

        for _ in 0..MAX_TICKS_PER_STEP {
            let more = layer.eval_step(&mut changes)?;
            scene.apply(&mut changes);
            peak_resident = peak_resident.max(layer.resident_count());

            for (frame, status) in layer.frame_status().iter().enumerate() {
                if status.complete {
                    compositor.compose(frame, layer.target());
                }
            }
            if !more && layer.in_flight_count() == 0 {
                break;
            }
            if !more {
                thread::sleep(TICK);
            }
        }

        debug!(
            step,
            zoom = ?layer.target_zoom_level(),
            targeted = layer.target().len(),
            resident = layer.resident_count(),
            scene = scene.tile_count(),
            "Camera step settled"
        );
    }

    layer.shutdown(&mut changes)?;
    scene.apply(&mut changes);
    let stats = layer.stats();

    Ok(Summary {
        steps: path.steps,
        elapsed: started.elapsed(),
        stats,
        events: logger.counts(),
        composed: compositor.composed().len(),
        peak_resident,
        scene_tiles: scene.tile_count(),
        scene_bytes: scene.bytes(),
        changes_applied: scene.applied(),
    })
}

fn main() {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args
        .config
        .clone()
        .or_else(|| Config::default_dir().ok())
        .unwrap_or_else(|| PathBuf::from(".quadpager"));

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    quadpager_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    info!(
        max_tiles = config.sampling.max_tiles,
        fetches = config.fetch.simultaneous_fetches,
        frames = config.sampling.image_depth,
        single_level = config.sampling.single_level,
        steps = config.demo.steps,
        "Starting tile sampling simulation"
    );

    match run(&config) {
        Ok(summary) => {
            info!(
                steps = summary.steps,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                issued = summary.stats.issued,
                loaded = summary.stats.loaded,
                failed = summary.stats.failed,
                stale = summary.stats.stale,
                cancelled = summary.stats.cancelled,
                unloaded = summary.stats.unloaded,
                "Scheduler totals"
            );
            info!(
                will_load = summary.events.will_load,
                did_load = summary.events.did_load,
                did_not_load = summary.events.did_not_load,
                will_unload = summary.events.will_unload,
                composed_frames = summary.composed,
                "Delegate totals"
            );
            info!(
                peak_resident = summary.peak_resident,
                scene_tiles = summary.scene_tiles,
                scene_bytes = summary.scene_bytes,
                changes = summary.changes_applied,
                "Simulation complete"
            );
        }
        Err(e) => {
            error!(%e, "Simulation failed");
            std::process::exit(1);
        }
    }
}

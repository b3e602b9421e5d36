//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Tile selection and budget.
    pub sampling: SamplingConfig,
    /// Fetch concurrency.
    pub fetch: FetchConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
    /// Headless simulation settings.
    pub demo: DemoConfig,
}

/// Tile selection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Coarsest level loaded.
    pub min_zoom: u32,
    /// Finest level loaded.
    pub max_zoom: u32,
    /// Frames per tile.
    pub image_depth: usize,
    /// Load a single level instead of a mixed-level cover.
    pub single_level: bool,
    /// Multiplier applied to screen-space importance.
    pub importance_scale: f64,
    /// Resident tile budget.
    pub max_tiles: usize,
    /// Tiles at or above `min_zoom` less important than this are skipped.
    pub min_importance: f64,
    /// Tile edge in pixels.
    pub tile_size: u32,
    /// Loaded-frame ratio above which an in-flight tile is not evicted.
    pub near_completion: f64,
    /// Extra coarser levels (non-positive offsets) in single-level mode.
    pub multi_level_loads: Vec<i32>,
}

/// Fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum fetches in flight.
    pub simultaneous_fetches: usize,
    /// Worker threads (0 = one per CPU).
    pub worker_threads: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "quadpager_sampler=trace").
    pub log_level: String,
    /// Log every tile event a delegate receives.
    pub log_tile_events: bool,
}

/// Headless simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Camera steps to simulate.
    pub steps: u32,
    /// Seed for synthetic latency and failures.
    pub seed: u64,
    /// Camera height at the first step.
    pub start_height: f64,
    /// Camera height at the last step.
    pub end_height: f64,
    /// Upper bound on synthetic fetch latency in milliseconds.
    pub max_latency_ms: u64,
    /// Probability that a synthetic fetch fails.
    pub failure_rate: f64,
}

// --- Default implementations ---

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 18,
            image_depth: 1,
            single_level: false,
            importance_scale: 1.0,
            max_tiles: 128,
            min_importance: 1e-3,
            tile_size: 256,
            near_completion: 0.75,
            multi_level_loads: Vec::new(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            simultaneous_fetches: 8,
            worker_threads: 0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_tile_events: false,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            steps: 120,
            seed: 42,
            start_height: 2.0,
            end_height: 0.01,
            max_latency_ms: 4,
            failure_rate: 0.02,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for quadpager (e.g. `~/.config/quadpager`).
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("quadpager"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            tracing::info!(path = %config_path.display(), "Loaded config");
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            tracing::info!(path = %config_path.display(), "Created default config");
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &new_config != self {
            tracing::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }
}

//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Quadpager command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "quadpager", about = "Quad-tree tile sampling simulation")]
pub struct CliArgs {
    /// Resident tile budget.
    #[arg(long)]
    pub max_tiles: Option<usize>,

    /// Maximum fetches in flight.
    #[arg(long)]
    pub fetches: Option<usize>,

    /// Frames per tile.
    #[arg(long)]
    pub frames: Option<usize>,

    /// Load a single zoom level.
    #[arg(long)]
    pub single_level: Option<bool>,

    /// Finest zoom level.
    #[arg(long)]
    pub max_zoom: Option<u32>,

    /// Camera steps to simulate.
    #[arg(long)]
    pub steps: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(max_tiles) = args.max_tiles {
            self.sampling.max_tiles = max_tiles;
        }
        if let Some(fetches) = args.fetches {
            self.fetch.simultaneous_fetches = fetches;
        }
        if let Some(frames) = args.frames {
            self.sampling.image_depth = frames;
        }
        if let Some(single) = args.single_level {
            self.sampling.single_level = single;
        }
        if let Some(max_zoom) = args.max_zoom {
            self.sampling.max_zoom = max_zoom;
        }
        if let Some(steps) = args.steps {
            self.demo.steps = steps;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs::parse_from(["quadpager", "--max-tiles", "32", "--single-level", "true"]);
        config.apply_cli_overrides(&args);
        assert_eq!(config.sampling.max_tiles, 32);
        assert!(config.sampling.single_level);
        // Non-overridden fields retain defaults
        assert_eq!(config.fetch.simultaneous_fetches, 8);
        assert_eq!(config.demo.steps, 120);
    }

    #[test]
    fn test_cli_no_override() {
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_dir_flag() {
        let args = CliArgs::parse_from(["quadpager", "--config", "/tmp/qp", "--steps", "5"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/qp")));
        assert_eq!(args.steps, Some(5));
    }
}

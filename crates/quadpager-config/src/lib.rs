//! Configuration for the tile sampler.
//!
//! Settings persist to disk as RON and can be overridden from the command
//! line. Every section tolerates missing and unknown fields so older and
//! newer files both load.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CONFIG_FILE, Config, DebugConfig, DemoConfig, FetchConfig, SamplingConfig};
pub use error::ConfigError;

//! CLI argument parsing with clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::camera::SimulatedOutcome;

/// Camera capture with an offline, cache-first asset interceptor
#[derive(Parser, Debug)]
#[command(name = "pwa-camera")]
#[command(version, about = "Camera capture with an offline cache-first interceptor", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured origin URL
    #[arg(long, global = true)]
    pub origin: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open the camera, capture one photo and close it
    Capture {
        /// Where to write the PNG (default: capture-<timestamp>.png)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Print the photo as a data URL instead of writing a file
        #[arg(long)]
        print_data_url: bool,

        /// Simulate a camera outcome with the test-pattern backend
        #[arg(long)]
        simulate: Option<SimulateMode>,
    },
    /// Fetch paths of the origin through the offline interceptor
    Fetch {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Inspect or clear the offline store
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// List available cameras
    ListCameras,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CacheAction {
    /// Show the store name and entry count
    Info,
    /// Delete the current store
    Clear,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

/// Camera outcomes the test-pattern backend can simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SimulateMode {
    Grant,
    Deny,
    NoDevice,
    Busy,
    Fail,
}

impl From<SimulateMode> for SimulatedOutcome {
    fn from(mode: SimulateMode) -> Self {
        match mode {
            SimulateMode::Grant => SimulatedOutcome::Grant,
            SimulateMode::Deny => SimulatedOutcome::Deny,
            SimulateMode::NoDevice => SimulatedOutcome::NoDevice,
            SimulateMode::Busy => SimulatedOutcome::Busy,
            SimulateMode::Fail => SimulatedOutcome::Fail("simulated failure".to_string()),
        }
    }
}

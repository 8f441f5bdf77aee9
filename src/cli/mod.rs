//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing and subcommand handlers.

mod args;
mod commands;

pub use args::{Args, CacheAction, Command, ConfigAction, SimulateMode};
pub use commands::{cache, capture, fetch, handle_config_action, init_config, list_cameras};

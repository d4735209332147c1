//! CLI module for meshstate
//!
//! Provides command-line interface for:
//! - settings: print the effective settings of a node configuration
//! - simulate: run publication rounds over in-process nodes
//! - recover: run an interrupted and reestablished shard recovery

mod args;
mod commands;
mod config;
mod errors;

pub use args::{Cli, Command};
pub use commands::{recover, run, run_command, settings, simulate};
pub use config::NodeConfig;
pub use errors::{CliError, CliErrorCode, CliResult};

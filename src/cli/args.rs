//! CLI argument definitions using clap
//!
//! Commands:
//! - meshstate settings [--config <path>]
//! - meshstate simulate [--config <path>] --nodes <n> --acks <k>
//! - meshstate recover [--config <path>] --total-bytes <n> --interrupt-after <chunks>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// meshstate - cluster state publication and shard recovery
#[derive(Parser, Debug)]
#[command(name = "meshstate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Only log warnings and errors
    #[arg(long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the effective discovery and recovery settings
    Settings {
        /// Path to node configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run publication rounds against in-process nodes
    Simulate {
        /// Path to node configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of nodes, all voting
        #[arg(long, default_value_t = 5)]
        nodes: usize,

        /// Number of nodes that answer; the rest never respond
        #[arg(long)]
        acks: Option<usize>,

        /// Delay before each responsive node answers, in milliseconds
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,

        /// Number of consecutive rounds
        #[arg(long, default_value_t = 1)]
        rounds: u32,
    },

    /// Run one shard recovery that is interrupted and reestablished
    Recover {
        /// Path to node configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Size of the shard transfer stream
        #[arg(long, default_value_t = 4 * 1024 * 1024)]
        total_bytes: u64,

        /// Chunks sent before the connection drops
        #[arg(long, default_value_t = 3)]
        interrupt_after: u64,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

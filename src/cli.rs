//! CLI argument parsing using clap v4

use clap::{Parser, Subcommand};

/// EmoSense runtime - task and batch executors for emotion inference
///
/// Runs synthetic workloads through the single-task and batching executors
/// and manages runtime configuration.
#[derive(Parser, Debug)]
#[command(name = "emosense-runtime")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Push a synthetic emotion-scoring workload through both executors
    Benchmark {
        /// Number of benchmark iterations
        #[arg(short, long, default_value = "3")]
        iterations: u32,

        /// Frames scored per iteration
        #[arg(short = 'n', long, default_value = "1000")]
        items: usize,

        /// Path to configuration file
        #[arg(short, long, env = "EMOSENSE_CONFIG")]
        config: Option<String>,

        /// Output file for benchmark results (JSON)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

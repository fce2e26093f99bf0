//! EmoSense runtime CLI
//!
//! Benchmarks the executors and manages runtime configuration.

mod cli;

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use emosense_runtime::benchmark::{BenchmarkResults, BenchmarkRunner};
use emosense_runtime::error::Result;
use emosense_runtime::{config, logging, version, RuntimeConfig};

use crate::cli::{Cli, Commands, ConfigSubcommand};

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            version::print_version();
            Ok(())
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            handle_config_command(subcommand)
        }
        Commands::Benchmark {
            iterations,
            items,
            config,
            output,
        } => {
            let config = match RuntimeConfig::load(config.as_deref()) {
                Ok(cfg) => cfg,
                Err(e) => {
                    eprint!("{}", e.format_for_terminal());
                    std::process::exit(e.exit_code());
                }
            };

            // Held until exit so buffered file logs are flushed
            let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

            let build = version::BuildInfo::current();
            info!(
                version = %build.full_version(),
                target = %build.target,
                profile = %build.profile,
                "Starting EmoSense runtime benchmark"
            );

            run_benchmark(&config, iterations, items, output)
        }
    }
}

fn run_benchmark(
    config: &RuntimeConfig,
    iterations: u32,
    items: usize,
    output: Option<String>,
) -> Result<()> {
    let mut runner = BenchmarkRunner::new(iterations, items)
        .with_configs(config.executor_config(), config.batch_config());
    if let Some(ref path) = output {
        runner = runner.with_results_path(PathBuf::from(path));
    }

    let results = runner.run()?;
    print_results(&results);

    if let Some(ref path) = output {
        println!("  Results saved to: {}", path);
    }

    Ok(())
}

fn print_results(results: &BenchmarkResults) {
    let single = &results.single;
    let batch = &results.batch;

    println!();
    println!(
        "Benchmark Results ({} iterations x {} frames):",
        results.iterations, results.items_per_iteration
    );
    println!();
    println!(
        "  Single-task executor ({} workers, queue {}):",
        single.workers, single.queue_capacity
    );
    println!("    Throughput:      {:.0} frames/sec", single.frames_per_second);
    println!("    Completed:       {}", single.completed);
    println!("    Failed:          {}", single.failed);
    println!("    QueueFull:       {}", single.rejected);
    println!();
    println!(
        "  Batch executor (batch {}, max outstanding {}):",
        batch.batch_size, batch.max_outstanding
    );
    println!("    Throughput:      {:.0} frames/sec", batch.frames_per_second);
    println!("    Completed:       {}", batch.completed);
    println!("    Failed:          {}", batch.failed);
    println!("    BatchQueueFull:  {}", batch.rejected);
    println!(
        "    Batches:         {} (mean size {:.2})",
        batch.batches, batch.mean_batch_size
    );
    println!();
    println!("  Dominant emotions:");
    for (label, count) in &results.dominant_counts {
        println!("    {:<10} {}", label, count);
    }
    println!();
    println!("  Duration:          {:.2}s", results.duration_secs);
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = RuntimeConfig::load(config.as_deref())?;
            println!("{}", cfg.to_toml()?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", written.display());
        }
        ConfigSubcommand::Validate { config } => match RuntimeConfig::load(config.as_deref()) {
            Ok(_) => {
                println!("Configuration is valid.");
            }
            Err(e) => {
                eprint!("{}", e.format_for_terminal());
                std::process::exit(e.exit_code());
            }
        },
    }

    Ok(())
}

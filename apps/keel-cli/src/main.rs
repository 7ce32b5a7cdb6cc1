mod demo;

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use keel_kernel::SchedulerConfig;
use keel_tools::{DeterminismValidator, WorldInspector};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keel-cli", about = "CLI tool for the keel engine core")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version and crate info
    Info,
    /// Run the particle demo twice and compare world hashes
    Simulate {
        /// Number of frames to step
        #[arg(short, long, default_value = "120")]
        frames: u64,
        /// Seed for the world's RNG resource
        #[arg(short, long, default_value = "42")]
        seed: u32,
        /// Real seconds per frame; defaults to the fixed delta
        #[arg(long)]
        dt: Option<f64>,
        /// YAML scheduler config
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print per-stage timings
        #[arg(long)]
        profile: bool,
    },
    /// Check the demo schedule for determinism hazards
    Validate {
        /// YAML scheduler config
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("keel-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("ecs: {}", keel_ecs::crate_info());
            println!("kernel: {}", keel_kernel::crate_info());
            println!("tools: {}", keel_tools::crate_info());
        }
        Commands::Simulate {
            frames,
            seed,
            dt,
            config,
            profile,
        } => {
            let config = load_config(config.as_deref())?;
            let dt = dt.unwrap_or(config.fixed_delta);
            println!("Particle demo: seed={seed}, frames={frames}, dt={dt}");

            let first = simulate(&config, seed, frames, dt, profile)?;
            let second = simulate(&config, seed, frames, dt, false)?;

            println!("Run 1: {}", first.hash);
            println!("Run 2: {}", second.hash);
            println!("Match: {}", first.hash == second.hash);
            println!("{}", first.summary);
            println!(
                "fixed steps: {}, frames: {}",
                first.fixed_steps, first.frame_count
            );
            for (name, stats) in &first.timings {
                println!(
                    "  {name}: calls={} avg={:?} max={:?}",
                    stats.count,
                    stats.average(),
                    stats.max
                );
            }
        }
        Commands::Validate { config } => {
            let config = load_config(config.as_deref())?;
            let scheduler = demo::build(&config, 0)?;
            let report = DeterminismValidator::validate(&scheduler);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_deterministic() {
                anyhow::bail!("{} determinism violation(s)", report.violations.len());
            }
        }
    }

    Ok(())
}

struct SimulationRun {
    hash: String,
    summary: keel_tools::WorldSummary,
    fixed_steps: u64,
    frame_count: u64,
    timings: Vec<(String, keel_kernel::ProfileStats)>,
}

fn simulate(
    config: &SchedulerConfig,
    seed: u32,
    frames: u64,
    dt: f64,
    profile: bool,
) -> anyhow::Result<SimulationRun> {
    let mut scheduler = demo::build(config, seed)?;
    scheduler.profiler_mut().set_enabled(profile || config.profiling);

    for _ in 0..frames {
        pollster::block_on(scheduler.step(dt))?;
    }
    pollster::block_on(scheduler.shutdown())?;

    let time = scheduler.time();
    Ok(SimulationRun {
        hash: demo::world_hash(scheduler.world()),
        summary: WorldInspector::summary(scheduler.world()),
        fixed_steps: time.fixed_step_count,
        frame_count: time.frame_count,
        timings: scheduler
            .profiler()
            .entries()
            .map(|(name, stats)| (name.to_string(), *stats))
            .collect(),
    })
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SchedulerConfig> {
    let Some(path) = path else {
        return Ok(SchedulerConfig::default());
    };
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let config = serde_yaml::from_reader(file)
        .with_context(|| format!("parsing scheduler config {}", path.display()))?;
    tracing::debug!(?config, "loaded scheduler config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn yaml_config_fills_defaults() {
        let config: SchedulerConfig = serde_yaml::from_str("fixed_delta: 0.02\n").unwrap();
        assert_eq!(config.fixed_delta, 0.02);
        assert_eq!(config.max_catch_up_steps, 5);
        assert!(!config.profiling);
    }

    #[test]
    fn simulate_is_repeatable() {
        let config = SchedulerConfig::default();
        let a = simulate(&config, 9, 30, config.fixed_delta, true).unwrap();
        let b = simulate(&config, 9, 30, config.fixed_delta, false).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.frame_count, 30);
        assert!(!a.timings.is_empty());
        assert!(b.timings.is_empty());
    }
}

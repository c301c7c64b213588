//! Command-line surface of `spsa-tune`.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use spsa_optimizer::{SpsaOptimizer, TrajectoryStore};
use spsa_types::ParameterVector;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::builder::EngineBuilder;
use crate::config::RunnerConfig;
use crate::cutechess::{CutechessEvaluator, CutechessVerifier};
use crate::source::{clamp_for_preview, render_constants};

#[derive(Parser, Debug)]
#[command(name = "spsa-tune", version, about = "SPSA tuning of engine search parameters")]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = "SPSA_TUNE_CONFIG", default_value = "spsa-tune.json")]
    pub config: PathBuf,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the tuning loop
    Run(RunArgs),
    /// Write a configuration file with every default filled in
    InitConfig(InitConfigArgs),
    /// Print the constants module for a parameter vector
    Render(RenderArgs),
    /// Compare the first and last vectors of a trajectory
    Summary(SummaryArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Continue from the last snapshot in the history file
    #[arg(long)]
    pub resume: bool,

    /// Override the configured seed
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Destination of the generated file
    #[arg(short, long, default_value = "spsa-tune.json")]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Use the last vector of this trajectory instead of the initial values
    #[arg(long)]
    pub trajectory: Option<PathBuf>,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SummaryArgs {
    /// Trajectory file; defaults to the configured history path
    #[arg(long)]
    pub trajectory: Option<PathBuf>,
}

pub fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => run(&cli.config, args, cli.json),
        Commands::InitConfig(args) => init_config(args),
        Commands::Render(args) => render(&cli.config, args),
        Commands::Summary(args) => summary(&cli.config, args, cli.json),
    }
}

fn load_config(path: &Path) -> Result<RunnerConfig> {
    RunnerConfig::load_from_file(path).with_context(|| format!("Failed to load configuration {}", path.display()))
}

fn run(config_path: &Path, args: RunArgs, json_output: bool) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(seed) = args.seed {
        config.run.seed = Some(seed);
    }
    let space = config.space()?;

    let builder = EngineBuilder::new(config.builder.clone());
    let evaluator = CutechessEvaluator::new(config.match_runner.clone(), &config.builder);
    let mut optimizer = SpsaOptimizer::new(config.run.clone(), space.clone(), builder, evaluator)?
        .with_trajectory_sink(&config.history_path);
    if config.run.verification_enabled() {
        optimizer = optimizer.with_verifier(CutechessVerifier::new(config.match_runner.clone()));
    }

    if args.resume {
        let history = TrajectoryStore::load(&config.history_path, space)
            .with_context(|| format!("Failed to resume from {}", config.history_path.display()))?;
        optimizer = optimizer.resume_from(history)?;
    } else if config.history_path.exists() {
        warn!("Overwriting existing history {}", config.history_path.display());
    }

    info!(
        "Starting run {} with seed {} ({} parameters, {} iterations)",
        optimizer.status().id,
        optimizer.seed(),
        optimizer.space().len(),
        config.run.num_iterations
    );

    let result = optimizer.run();
    let status = optimizer.status();
    if json_output {
        let report = json!({
            "status": status,
            "seed": optimizer.seed(),
            "params": optimizer.current().to_map(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", optimizer.current());
    }

    let outcome = result.with_context(|| {
        format!(
            "Run stopped after {} iterations; history kept at {}",
            status.iterations_completed,
            config.history_path.display()
        )
    })?;
    info!(
        "Run completed: {} iterations, {} snapshots",
        outcome.status.iterations_completed,
        outcome.history.len()
    );
    Ok(())
}

fn init_config(args: InitConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!("{} already exists; pass --force to overwrite", args.output.display());
    }
    RunnerConfig::default()
        .save_to_file(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("Wrote default configuration to {}", args.output.display());
    Ok(())
}

fn render(config_path: &Path, args: RenderArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let space = config.space()?;

    let vector = match &args.trajectory {
        Some(path) => last_snapshot(path, &config)?,
        None => space.initial_with_overrides(&config.run.initial_overrides)?,
    };
    let text = render_constants(&clamp_for_preview(&vector));

    match &args.output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote constants to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn last_snapshot(path: &Path, config: &RunnerConfig) -> Result<ParameterVector> {
    let store = TrajectoryStore::load(path, config.space()?)
        .with_context(|| format!("Failed to load trajectory {}", path.display()))?;
    store
        .last()
        .cloned()
        .with_context(|| format!("{} holds no snapshots", path.display()))
}

fn summary(config_path: &Path, args: SummaryArgs, json_output: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let path = args.trajectory.unwrap_or_else(|| config.history_path.clone());
    let store = TrajectoryStore::load(&path, config.space()?)
        .with_context(|| format!("Failed to load trajectory {}", path.display()))?;
    print!("{}", summary_report(&store, &path, json_output)?);
    Ok(())
}

/// First-versus-last comparison of a trajectory, as text or JSON.
fn summary_report(store: &TrajectoryStore, path: &Path, json_output: bool) -> Result<String> {
    let (Some(first), Some(last)) = (store.first(), store.last()) else {
        bail!("{} holds no snapshots", path.display());
    };
    let iterations = store.len() - 1;

    if json_output {
        let rows: Vec<_> = first
            .iter()
            .zip(last.values())
            .map(|((name, start), end)| json!({ "name": name, "initial": start, "current": end, "change": end - start }))
            .collect();
        let report = json!({ "iterations": iterations, "parameters": rows });
        return Ok(serde_json::to_string_pretty(&report)? + "\n");
    }

    let mut out = format!("{} iterations recorded in {}\n", iterations, path.display());
    let width = first.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for ((name, start), end) in first.iter().zip(last.values()) {
        out.push_str(&format!("{name:<width$}  {start:>12.4} -> {end:>12.4}  ({:+.4})\n", end - start));
    }
    Ok(out)
}

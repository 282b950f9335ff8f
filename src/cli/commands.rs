//! CLI command definitions for espresso-forge.
//!
//! `run` drives the band-structure pipeline for one material, `stage` runs a
//! single solver, `scan` extracts progress markers from an existing output
//! file and `deck` renders a YAML deck description.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::SolverConfig;
use crate::deck::Deck;
use crate::metrics::{export_metrics, init_metrics};
use crate::pipeline::{Pipeline, PipelinePlan};
use crate::runner::{
    CancelToken, ConsoleObserver, ProgressObserver, StageKind, StageRunner, TracingObserver,
};
use crate::scanner;

/// Quantum ESPRESSO workflow runner.
#[derive(Parser)]
#[command(name = "espresso-forge")]
#[command(about = "Run and monitor Quantum ESPRESSO calculation pipelines")]
#[command(version)]
#[command(
    long_about = "espresso-forge launches Quantum ESPRESSO executables, follows their output while they run and chains the band-structure stages for one material.\n\nExample usage:\n  espresso-forge run ./results/WS2 WS2 --workers 4"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file.
    #[arg(short, long, env = "ESPRESSO_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Write Prometheus metrics to this file on exit.
    #[arg(long, global = true)]
    pub metrics_out: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the band-structure pipeline (scf, bands, post-processing, nscf, dos, pdos).
    Run(RunArgs),

    /// Run a single solver stage.
    Stage(StageArgs),

    /// Extract energy, CPU time and convergence from an existing output file.
    Scan(ScanArgs),

    /// Render a YAML deck description as a namelist input file.
    Deck(DeckArgs),
}

/// Solver overrides shared by `run` and `stage`.
#[derive(Parser, Debug, Default)]
pub struct SolverArgs {
    /// Number of workers passed to the launcher.
    #[arg(short = 'n', long)]
    pub workers: Option<usize>,

    /// Parallel launcher (e.g. mpirun, srun).
    #[arg(long, conflicts_with = "no_launcher")]
    pub launcher: Option<String>,

    /// Run executables directly, without a launcher.
    #[arg(long)]
    pub no_launcher: bool,

    /// Pseudopotential directory, exported as ESPRESSO_PSEUDO.
    #[arg(long)]
    pub pseudo_dir: Option<PathBuf>,

    /// Kill a stage that runs longer than this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Arguments for `espresso-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Working directory holding the `.pwi` decks.
    pub workdir: PathBuf,

    /// File prefix, usually the reduced formula (e.g. WS2).
    pub prefix: String,

    /// Resume from this step (e.g. nscf).
    #[arg(long)]
    pub from: Option<String>,

    /// Print the pipeline report as JSON instead of progress lines.
    #[arg(short = 'j', long)]
    pub json: bool,

    #[command(flatten)]
    pub solver: SolverArgs,
}

/// Arguments for `espresso-forge stage`.
#[derive(Parser, Debug)]
pub struct StageArgs {
    /// Stage kind: pw, bands, dos or pdos.
    pub kind: StageKind,

    /// Working directory of the solver.
    pub workdir: PathBuf,

    /// Input deck, relative to the working directory.
    pub input: PathBuf,

    /// Output file, relative to the working directory.
    pub output: PathBuf,

    /// Print the run result as JSON instead of progress lines.
    #[arg(short = 'j', long)]
    pub json: bool,

    #[command(flatten)]
    pub solver: SolverArgs,
}

/// Arguments for `espresso-forge scan`.
#[derive(Parser, Debug)]
pub struct ScanArgs {
    /// Solver output file.
    pub file: PathBuf,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `espresso-forge deck`.
#[derive(Parser, Debug)]
pub struct DeckArgs {
    /// YAML description (section name → parameters).
    pub file: PathBuf,

    /// Write the deck here instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    if cli.metrics_out.is_some() {
        init_metrics().context("Failed to initialize metrics")?;
    }

    let outcome = match cli.command {
        Commands::Run(args) => run_pipeline_command(cli.config.as_deref(), args).await,
        Commands::Stage(args) => run_stage_command(cli.config.as_deref(), args).await,
        Commands::Scan(args) => run_scan_command(args),
        Commands::Deck(args) => run_deck_command(args),
    };

    if let Some(path) = &cli.metrics_out {
        fs::write(path, export_metrics())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        info!(path = %path.display(), "Wrote metrics");
    }

    outcome
}

/// Layers defaults, the config file, the environment and CLI flags.
fn build_config(path: Option<&Path>, args: &SolverArgs) -> anyhow::Result<SolverConfig> {
    let mut config = match path {
        Some(path) => SolverConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SolverConfig::default(),
    };
    config.apply_env()?;

    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if args.no_launcher {
        config.launcher = None;
    } else if let Some(launcher) = &args.launcher {
        config.launcher = Some(launcher.clone());
    }
    if let Some(dir) = &args.pseudo_dir {
        config.pseudo_dir = Some(dir.clone());
    }
    if let Some(secs) = args.timeout_secs {
        config.stage_timeout = Some(Duration::from_secs(secs));
    }

    config.validate()?;
    Ok(config)
}

/// Cancels `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping the running solver");
            token.cancel();
        }
    });
}

fn observer_for(json: bool) -> Box<dyn ProgressObserver> {
    if json {
        Box::new(TracingObserver::new())
    } else {
        Box::new(ConsoleObserver::new())
    }
}

async fn run_pipeline_command(config_path: Option<&Path>, args: RunArgs) -> anyhow::Result<()> {
    let config = build_config(config_path, &args.solver)?;
    let cancel = CancelToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut plan = PipelinePlan::band_structure(&args.workdir, &args.prefix);
    if let Some(step) = &args.from {
        plan = plan.starting_at(step)?;
    }

    let runner = StageRunner::new(config).with_cancel(cancel);
    let pipeline = Pipeline::new(runner);
    let mut observer = observer_for(args.json);

    let report = pipeline.run(&plan, observer.as_mut()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        for record in &report.steps {
            println!(
                "{:<15} {:>8.1}s  exit {}",
                record.step,
                record.result.duration.as_secs_f64(),
                record.result.exit_code
            );
        }
        if let Some(energy) = report.final_energy() {
            println!("Final total energy: {} Ry", energy);
        }
    }

    match &report.halted {
        Some(halt) => Err(anyhow::anyhow!(
            "Pipeline halted at step '{}': {}",
            halt.step,
            halt.reason
        )),
        None => Ok(()),
    }
}

async fn run_stage_command(config_path: Option<&Path>, args: StageArgs) -> anyhow::Result<()> {
    let config = build_config(config_path, &args.solver)?;
    let cancel = CancelToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let runner = StageRunner::new(config).with_cancel(cancel);
    let mut observer = observer_for(args.json);

    let result = runner
        .run_stage(
            args.kind,
            &args.workdir,
            &args.input,
            &args.output,
            observer.as_mut(),
        )
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!("{} finished in {:.1}s", args.kind, result.duration.as_secs_f64());
        if let Some(energy) = result.sample.energy {
            println!("Final total energy: {} Ry", energy);
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ScanOutput<'a> {
    file: &'a Path,
    #[serde(flatten)]
    sample: scanner::ProgressSample,
}

fn run_scan_command(args: ScanArgs) -> anyhow::Result<()> {
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let sample = scanner::scan(&text);

    if args.json {
        let output = ScanOutput {
            file: &args.file,
            sample,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match sample.energy {
        Some(energy) => println!("Total energy: {} Ry", energy),
        None => println!("Total energy: n/a"),
    }
    println!("CPU time:     {}", sample.cpu_time.as_deref().unwrap_or("n/a"));
    println!("Converged:    {}", if sample.converged { "yes" } else { "no" });
    Ok(())
}

fn run_deck_command(args: DeckArgs) -> anyhow::Result<()> {
    let deck = Deck::from_yaml_file(&args.file)
        .with_context(|| format!("Failed to load deck description {}", args.file.display()))?;

    match &args.output {
        Some(path) => {
            deck.write_to(path)?;
            info!(path = %path.display(), sections = deck.sections().len(), "Wrote deck");
        }
        None => println!("{}", deck.render()),
    }
    Ok(())
}

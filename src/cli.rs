//! Command-line interface for abx-eval.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use crate::batch;
use crate::config::AppConfig;
use crate::pipeline::{Pipeline, RunOptions};
use crate::registry::DistanceRegistry;
use crate::stages::FsAdapters;

/// Registry key selected by the `--kl` shortcut.
const KL_DISTANCE: &str = "kl_divergence";

/// Full ABX discrimination evaluation.
#[derive(Parser, Debug)]
#[command(name = "abx-eval")]
#[command(about = "Run a batch of ABX discrimination tasks over a feature folder")]
#[command(version)]
pub struct Cli {
    /// Folder containing the features to evaluate.
    pub features: PathBuf,

    /// Output directory used for intermediate files and results.
    pub output: PathBuf,

    /// Batch config file (general defaults plus one section per task).
    #[arg(short, long, default_value = "eval.cfg")]
    pub config: PathBuf,

    /// Distance function to use (a registry key, default dtw_cosine).
    #[arg(short, long)]
    pub distance: Option<String>,

    /// Use kl-divergence, shortcut for '--distance kl_divergence'.
    #[arg(long)]
    pub kl: bool,

    /// Number of workers for the distance computation.
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Keep the per-task analysis table in the output folder.
    #[arg(long)]
    pub csv: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Parses the command line.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the batch described by the parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config_dir = cli
        .config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let app = AppConfig::new(config_dir, &cli.output);

    let distance = if cli.kl {
        Some(KL_DISTANCE.to_string())
    } else {
        cli.distance.clone()
    };
    let opts = RunOptions {
        distance,
        workers: cli.jobs,
        keep_analysis: cli.csv,
    };

    let registry = DistanceRegistry::with_defaults();
    let pipeline = Pipeline::new(FsAdapters);

    let summary = batch::run_batch(
        &cli.config,
        &cli.features,
        &app,
        &registry,
        &pipeline,
        &opts,
    )
    .context("batch run failed")?;

    if !summary.failed.is_empty() {
        anyhow::bail!("{} task(s) failed: {}", summary.failed.len(), summary.failed.join(", "));
    }
    Ok(())
}

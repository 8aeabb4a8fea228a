//! Batch driver: runs every configured task in order and writes the batch
//! results.
//!
//! Batch continuation policy lives here, not in the orchestrator: a failed
//! task gets a one-line diagnostic naming its section and failing stage, the
//! next task still runs, and the batch as a whole reports failure at the end
//! if any task did.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context};
use tracing::{error, info};

use crate::config::{self, AppConfig};
use crate::error::OutputError;
use crate::pipeline::{Pipeline, RunOptions, StageAdapters};
use crate::registry::DistanceRegistry;

/// Outcome of one batch: per-task scores plus the sections that failed.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// (section, percentage) per successful task, in config order.
    pub results: Vec<(String, f64)>,
    /// Sections whose run failed.
    pub failed: Vec<String>,
}

/// Runs all tasks of a batch config against one feature folder.
///
/// The feature folder must exist and be non-empty and the output directory
/// must be creatable before any task runs; task specifications are resolved
/// and validated up front, once for the whole batch.
pub fn run_batch<A: StageAdapters>(
    config_file: &Path,
    input_folder: &Path,
    app: &AppConfig,
    registry: &DistanceRegistry,
    pipeline: &Pipeline<A>,
    opts: &RunOptions,
) -> anyhow::Result<BatchSummary> {
    if !input_folder.is_dir()
        || fs::read_dir(input_folder)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    {
        bail!(
            "features folder not found or empty: {}",
            input_folder.display()
        );
    }

    fs::create_dir_all(&app.output_dir).with_context(|| {
        format!(
            "impossible to create the output directory {}",
            app.output_dir.display()
        )
    })?;

    let tasks = config::load_tasks(config_file, app)?;

    let mut summary = BatchSummary::default();
    for task in &tasks {
        info!(task = %task.section, "processing task");
        match pipeline.run(task, input_folder, registry, opts) {
            Ok(score) => {
                println!("{}:\t{:.3} %", task.section, score);
                summary.results.push((task.section.clone(), score));
            }
            Err(e) => {
                let stage = e
                    .failed_stage()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string());
                error!(task = %task.section, stage = %stage, error = %e, "task failed");
                summary.failed.push(task.section.clone());
            }
        }
    }

    write_results(&tasks[0].output_file, &summary.results)?;
    write_version_marker(app)?;

    Ok(summary)
}

/// Writes the batch results table: a `task<TAB>score` header, then one row
/// per task with the percentage to three decimals.
pub fn write_results(path: &Path, results: &[(String, f64)]) -> Result<(), OutputError> {
    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(path)?;
        writeln!(file, "task\tscore")?;
        for (section, score) in results {
            writeln!(file, "{section}:\t{score:.3} %")?;
        }
        Ok(())
    };
    write().map_err(|source| OutputError::ResultsWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Drops the empty version marker (`VERSION_<version>`) into the output
/// directory.
pub fn write_version_marker(app: &AppConfig) -> Result<(), OutputError> {
    let path = app.output_dir.join(format!("VERSION_{}", app.version));
    fs::write(&path, b"").map_err(|source| OutputError::VersionMarker {
        path: path.clone(),
        source,
    })
}

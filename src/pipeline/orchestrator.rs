//! Pipeline orchestrator: runs the four stages in fixed order with
//! staleness short-circuiting and guaranteed artifact cleanup.
//!
//! The state machine is linear: INGEST -> DISTANCE -> SCORE -> ANALYZE ->
//! AGGREGATE, with failure terminal from any state. Before each stage the
//! staleness oracle is consulted; a stale artifact is removed before the
//! adapter runs, never appended to. Whatever path the run takes, the drop
//! guard removes every transient artifact before the call returns: the
//! distance and score artifacts always, the analysis artifact unless the
//! keep policy retains it, and the feature artifact at end of run only,
//! never mid-pipeline.

use std::path::{Path, PathBuf};

use tracing::info;

use super::staleness;
use super::{PipelineError, Stage, StageAdapters, FEATURES_GROUP};
use crate::aggregate;
use crate::registry::{DistanceEntry, DistanceRegistry, DEFAULT_DISTANCE};
use crate::storage;
use crate::task::TaskSpec;

/// Per-run options supplied by the batch driver.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Distance registry key overriding the task's configured one.
    pub distance: Option<String>,
    /// Worker-count override for the distance adapter.
    pub workers: Option<usize>,
    /// Retain the analysis artifact after the run.
    pub keep_analysis: bool,
}

/// Removes the registered artifact paths when dropped, on success and
/// failure alike. Removal is best effort and never masks the primary error.
struct CleanupGuard {
    paths: Vec<PathBuf>,
}

impl CleanupGuard {
    fn for_task(task: &TaskSpec, keep_analysis: bool) -> Self {
        let mut paths = vec![task.distance_file.clone(), task.score_file.clone()];
        if !keep_analysis {
            paths.push(task.analyze_file.clone());
        }
        paths.push(task.feature_file.clone());
        Self { paths }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            storage::try_remove(path);
        }
    }
}

/// Drives one task through the stage pipeline.
pub struct Pipeline<A> {
    adapters: A,
}

impl<A: StageAdapters> Pipeline<A> {
    /// Creates a pipeline over the given stage adapters.
    pub fn new(adapters: A) -> Self {
        Self { adapters }
    }

    /// Runs one task end to end and returns its percentage score.
    ///
    /// Resolves the distance function before touching the filesystem,
    /// prepares the artifact directories, executes the stages, aggregates
    /// the analysis table, and cleans up transient artifacts on every exit
    /// path.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`]; a stage-adapter failure aborts the
    /// remaining stages immediately and still performs cleanup.
    pub fn run(
        &self,
        task: &TaskSpec,
        input_folder: &Path,
        registry: &DistanceRegistry,
        opts: &RunOptions,
    ) -> Result<f64, PipelineError> {
        // Resolution failure aborts before any file I/O.
        let entry = registry.resolve(resolve_distance_key(opts, task))?;
        let workers = opts.workers.unwrap_or(task.workers);

        storage::ensure_parent_dirs(&task.artifact_paths())?;

        let _guard = CleanupGuard::for_task(task, opts.keep_analysis);

        self.run_stages(task, input_folder, entry, workers)?;

        info!(task = %task.section, "collapsing the results");
        let task_type = task.task_type.as_deref().unwrap_or("");
        let score = aggregate::aggregate_file(&task.analyze_file, task_type)?;
        Ok(score)
    }

    /// Executes the four stages with staleness short-circuiting and no
    /// cleanup.
    ///
    /// Running this twice with an unchanged task and input folder performs
    /// zero adapter invocations the second time. Once a stage recomputes,
    /// every downstream stage recomputes too, so no stage ever reads an
    /// artifact older than its inputs.
    pub fn run_stages(
        &self,
        task: &TaskSpec,
        input_folder: &Path,
        entry: &DistanceEntry,
        workers: usize,
    ) -> Result<(), PipelineError> {
        let spec_string = task.canonical_spec_string();
        let mut upstream_ran = false;

        if staleness::ingest_is_stale(input_folder, &task.feature_file) {
            info!(task = %task.section, "writing the features artifact");
            storage::try_remove(&task.feature_file);
            self.adapters
                .ingest(input_folder, &task.feature_file)
                .map_err(|source| PipelineError::Stage {
                    stage: Stage::Ingest,
                    source,
                })?;
            storage::write_completion(&task.feature_file, None)?;
            upstream_ran = true;
        }

        if upstream_ran || staleness::distance_is_stale(&task.distance_file, entry) {
            info!(task = %task.section, distance = %entry.fingerprint(), "computing the distances");
            storage::try_remove(&task.distance_file);
            self.adapters
                .distances(
                    &task.feature_file,
                    FEATURES_GROUP,
                    &task.task_file,
                    &task.distance_file,
                    entry,
                    true,
                    workers,
                )
                .map_err(|source| PipelineError::Stage {
                    stage: Stage::Distance,
                    source,
                })?;
            storage::write_completion(&task.distance_file, Some(&entry.fingerprint()))?;
            upstream_ran = true;
        }

        if upstream_ran || staleness::spec_is_stale(&task.score_file, &spec_string) {
            info!(task = %task.section, "computing the scores");
            storage::try_remove(&task.score_file);
            self.adapters
                .score(&task.task_file, &task.distance_file, &task.score_file)
                .map_err(|source| PipelineError::Stage {
                    stage: Stage::Score,
                    source,
                })?;
            storage::write_completion(&task.score_file, Some(&spec_string))?;
            upstream_ran = true;
        }

        if upstream_ran || staleness::spec_is_stale(&task.analyze_file, &spec_string) {
            info!(task = %task.section, "collapsing the scores into the analysis table");
            storage::try_remove(&task.analyze_file);
            self.adapters
                .analyze(&task.task_file, &task.score_file, &task.analyze_file)
                .map_err(|source| PipelineError::Stage {
                    stage: Stage::Analyze,
                    source,
                })?;
            storage::write_completion(&task.analyze_file, Some(&spec_string))?;
        }

        Ok(())
    }
}

/// Distance key precedence: caller override, then task config, then the
/// built-in default.
fn resolve_distance_key<'a>(opts: &'a RunOptions, task: &'a TaskSpec) -> &'a str {
    opts.distance
        .as_deref()
        .or(task.distance.as_deref())
        .unwrap_or(DEFAULT_DISTANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    use crate::config::AppConfig;

    fn task_spec(dir: &Path) -> TaskSpec {
        let mut items = HashMap::new();
        for key in [
            "featurefile",
            "taskfile",
            "distancefile",
            "scorefile",
            "analyzefile",
            "outputfile",
        ] {
            items.insert(key.to_string(), format!("{key}.dat"));
        }
        TaskSpec::resolve("t1", &items, &AppConfig::new(dir, dir)).unwrap()
    }

    #[test]
    fn test_resolve_distance_key_precedence() {
        let dir = tempdir().unwrap();
        let mut task = task_spec(dir.path());

        let mut opts = RunOptions::default();
        assert_eq!(resolve_distance_key(&opts, &task), DEFAULT_DISTANCE);

        task.distance = Some("kl_divergence".to_string());
        assert_eq!(resolve_distance_key(&opts, &task), "kl_divergence");

        opts.distance = Some("custom".to_string());
        assert_eq!(resolve_distance_key(&opts, &task), "custom");
    }

    #[test]
    fn test_cleanup_guard_removes_transients() {
        let dir = tempdir().unwrap();
        let task = task_spec(dir.path());
        for path in task.artifact_paths() {
            fs::write(path, b"x").unwrap();
        }

        drop(CleanupGuard::for_task(&task, true));

        assert!(!task.feature_file.exists());
        assert!(!task.distance_file.exists());
        assert!(!task.score_file.exists());
        assert!(task.analyze_file.exists());

        drop(CleanupGuard::for_task(&task, false));
        assert!(!task.analyze_file.exists());
    }
}

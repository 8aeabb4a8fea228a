//! Pipeline orchestration: stage identity, the stage-adapter seam, staleness
//! detection and the four-stage orchestrator.
//!
//! The orchestrator only ever talks to the numeric stages through the
//! [`StageAdapters`] trait; the built-in adapters live in [`crate::stages`]
//! and tests substitute counting mocks.

pub mod orchestrator;
pub mod staleness;

use std::path::Path;

use thiserror::Error;

use crate::error::{AggregateError, RegistryError, StoreError};
use crate::registry::DistanceEntry;

pub use orchestrator::{Pipeline, RunOptions};

/// Group key under which ingested features are stored in the feature
/// artifact.
pub const FEATURES_GROUP: &str = "features";

/// The four pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Feature ingestion from the input folder.
    Ingest,
    /// Pairwise distance computation.
    Distance,
    /// Per-triplet scoring.
    Score,
    /// Result collapsing into the analysis table.
    Analyze,
}

impl Stage {
    /// All stages, in pipeline order.
    pub const ALL: [Stage; 4] = [Stage::Ingest, Stage::Distance, Stage::Score, Stage::Analyze];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Ingest => write!(f, "ingest"),
            Stage::Distance => write!(f, "distance"),
            Stage::Score => write!(f, "score"),
            Stage::Analyze => write!(f, "analyze"),
        }
    }
}

/// External collaborators performing the numeric work of each stage.
///
/// Each method either completes, leaving a fully written artifact at
/// `output`, or fails; the orchestrator never inspects adapter internals and
/// attaches the completion footer itself after success.
pub trait StageAdapters {
    /// Converts the per-item feature files in `input_folder` into one feature
    /// artifact.
    fn ingest(&self, input_folder: &Path, output: &Path) -> anyhow::Result<()>;

    /// Computes the pairwise distances a task needs.
    ///
    /// `workers` is a degree-of-parallelism hint; the orchestrator passes it
    /// through without scheduling anything itself.
    #[allow(clippy::too_many_arguments)]
    fn distances(
        &self,
        feature_file: &Path,
        group_key: &str,
        task_file: &Path,
        output: &Path,
        entry: &DistanceEntry,
        normalized: bool,
        workers: usize,
    ) -> anyhow::Result<()>;

    /// Scores every triplet of the task from the distance table.
    fn score(&self, task_file: &Path, distance_file: &Path, output: &Path) -> anyhow::Result<()>;

    /// Collapses triplet scores into the analysis table.
    fn analyze(&self, task_file: &Path, score_file: &Path, output: &Path) -> anyhow::Result<()>;
}

/// Errors that can occur while running one task through the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Distance-function resolution failed; nothing was touched on disk.
    #[error("Distance resolution failed: {0}")]
    Distance(#[from] RegistryError),

    /// Artifact store failure (directory creation, footer write).
    #[error("Artifact store error: {0}")]
    Store(#[from] StoreError),

    /// A stage adapter failed; remaining stages were skipped.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    /// The analysis table could not be collapsed.
    #[error("Aggregation failed: {0}")]
    Aggregate(#[from] AggregateError),
}

impl PipelineError {
    /// The stage that failed, if the error came from a stage adapter.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

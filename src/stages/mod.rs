//! Built-in stage adapters.
//!
//! [`FsAdapters`] is the filesystem-backed implementation of the
//! [`StageAdapters`](crate::pipeline::StageAdapters) seam used by the CLI;
//! the orchestrator itself never depends on anything in this module beyond
//! the trait.

pub mod compute;
pub mod ingest;
pub mod metrics;

use std::path::Path;

use crate::pipeline::StageAdapters;
use crate::registry::DistanceEntry;

pub use compute::{PairDistance, ScoreRow, TaskDefinition, Triplet};
pub use ingest::{FeatureArchive, FeatureRecord};

/// Filesystem-backed stage adapters.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsAdapters;

impl StageAdapters for FsAdapters {
    fn ingest(&self, input_folder: &Path, output: &Path) -> anyhow::Result<()> {
        ingest::ingest_folder(input_folder, output)
    }

    fn distances(
        &self,
        feature_file: &Path,
        group_key: &str,
        task_file: &Path,
        output: &Path,
        entry: &DistanceEntry,
        normalized: bool,
        workers: usize,
    ) -> anyhow::Result<()> {
        compute::compute_distances(
            feature_file,
            group_key,
            task_file,
            output,
            entry,
            normalized,
            workers,
        )
    }

    fn score(&self, task_file: &Path, distance_file: &Path, output: &Path) -> anyhow::Result<()> {
        compute::score_triplets(task_file, distance_file, output)
    }

    fn analyze(&self, task_file: &Path, score_file: &Path, output: &Path) -> anyhow::Result<()> {
        compute::analyze_scores(task_file, score_file, output)
    }
}

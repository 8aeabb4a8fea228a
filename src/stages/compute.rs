//! Distance, score and analyze stage implementations.
//!
//! The task definition file is a JSON list of triplets; each names an
//! anchor, a same-class item and a different-class item plus the phone pair
//! and grouping key its result is attributed to. The distance stage computes
//! every unique (anchor, same) and (anchor, different) pair once, the score
//! stage turns each triplet into a 0/1 error, and the analyze stage collapses
//! errors into the mean error rate per (phone_1, phone_2, by) group.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::ingest::{FeatureArchive, FeatureRecord};
use crate::registry::DistanceEntry;
use crate::storage;

/// One ABX comparison unit from the task definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Triplet {
    /// The item being tested.
    pub anchor: String,
    /// Item of the same class as the anchor.
    pub same: String,
    /// Item of a different class.
    pub different: String,
    /// First phone of the contrast.
    pub phone_1: String,
    /// Second phone of the contrast.
    pub phone_2: String,
    /// Grouping key; a `('talker', 'context')` tuple literal for within
    /// tasks, the raw context for across tasks.
    pub by: String,
}

/// The task definition file payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub triplets: Vec<Triplet>,
}

/// One computed pair distance, the distance artifact's row type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairDistance {
    pub a: String,
    pub b: String,
    pub distance: f64,
}

/// One scored triplet, the score artifact's row type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRow {
    pub phone_1: String,
    pub phone_2: String,
    pub by: String,
    /// 1.0 when the anchor was closer to the different-class item.
    pub score: f64,
}

/// Reads and parses the task definition file.
pub fn read_task_definition(path: &Path) -> anyhow::Result<TaskDefinition> {
    let data = fs::read(path)
        .with_context(|| format!("could not read task file {}", path.display()))?;
    let definition: TaskDefinition = serde_json::from_slice(&data)
        .with_context(|| format!("malformed task file {}", path.display()))?;
    if definition.triplets.is_empty() {
        bail!("task file {} defines no triplets", path.display());
    }
    Ok(definition)
}

/// Computes the distances a task needs and writes the distance artifact.
///
/// `workers` sizes a dedicated rayon pool; the unique pairs are distributed
/// over it and the results written in deterministic order.
#[allow(clippy::too_many_arguments)]
pub fn compute_distances(
    feature_file: &Path,
    group_key: &str,
    task_file: &Path,
    output: &Path,
    entry: &DistanceEntry,
    normalized: bool,
    workers: usize,
) -> anyhow::Result<()> {
    let archive: FeatureArchive = serde_json::from_slice(&storage::read_payload(feature_file)?)
        .with_context(|| format!("malformed feature artifact {}", feature_file.display()))?;
    let Some(features) = archive.get(group_key) else {
        bail!(
            "feature artifact {} has no group '{group_key}'",
            feature_file.display()
        );
    };

    let definition = read_task_definition(task_file)?;
    let mut pairs: BTreeSet<(String, String)> = BTreeSet::new();
    for triplet in &definition.triplets {
        pairs.insert(ordered_pair(&triplet.anchor, &triplet.same));
        pairs.insert(ordered_pair(&triplet.anchor, &triplet.different));
    }

    let lookup = |item: &str| -> anyhow::Result<&FeatureRecord> {
        features
            .get(item)
            .with_context(|| format!("item '{item}' missing from the feature artifact"))
    };

    let pairs: Vec<(String, String)> = pairs.into_iter().collect();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("could not build the distance worker pool")?;
    let rows: Vec<PairDistance> = pool.install(|| {
        pairs
            .par_iter()
            .map(|(a, b)| -> anyhow::Result<PairDistance> {
                let fa = lookup(a)?;
                let fb = lookup(b)?;
                Ok(PairDistance {
                    a: a.clone(),
                    b: b.clone(),
                    distance: (entry.func)(&fa.frames, &fb.frames, normalized),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })?;

    fs::write(output, serde_json::to_vec(&rows)?)
        .with_context(|| format!("could not write distance artifact {}", output.display()))?;
    Ok(())
}

/// Scores every triplet from the distance table and writes the score
/// artifact.
pub fn score_triplets(
    task_file: &Path,
    distance_file: &Path,
    output: &Path,
) -> anyhow::Result<()> {
    let definition = read_task_definition(task_file)?;
    let rows: Vec<PairDistance> =
        serde_json::from_slice(&storage::read_payload(distance_file)?)
            .with_context(|| format!("malformed distance artifact {}", distance_file.display()))?;
    let distances: HashMap<(String, String), f64> = rows
        .into_iter()
        .map(|row| ((row.a, row.b), row.distance))
        .collect();

    let lookup = |x: &str, y: &str| -> anyhow::Result<f64> {
        distances
            .get(&ordered_pair(x, y))
            .copied()
            .with_context(|| format!("distance for pair ({x}, {y}) missing from the artifact"))
    };

    let mut scores = Vec::with_capacity(definition.triplets.len());
    for triplet in &definition.triplets {
        let d_same = lookup(&triplet.anchor, &triplet.same)?;
        let d_different = lookup(&triplet.anchor, &triplet.different)?;
        scores.push(ScoreRow {
            phone_1: triplet.phone_1.clone(),
            phone_2: triplet.phone_2.clone(),
            by: triplet.by.clone(),
            score: if d_same >= d_different { 1.0 } else { 0.0 },
        });
    }

    fs::write(output, serde_json::to_vec(&scores)?)
        .with_context(|| format!("could not write score artifact {}", output.display()))?;
    Ok(())
}

/// Collapses triplet scores into the analysis table: mean error rate per
/// (phone_1, phone_2, by) group, written as TSV.
pub fn analyze_scores(
    _task_file: &Path,
    score_file: &Path,
    output: &Path,
) -> anyhow::Result<()> {
    let scores: Vec<ScoreRow> = serde_json::from_slice(&storage::read_payload(score_file)?)
        .with_context(|| format!("malformed score artifact {}", score_file.display()))?;

    let mut groups: BTreeMap<(String, String, String), (f64, usize)> = BTreeMap::new();
    for row in scores {
        let entry = groups
            .entry((row.phone_1, row.phone_2, row.by))
            .or_insert((0.0, 0));
        entry.0 += row.score;
        entry.1 += 1;
    }

    let mut table = String::from("phone_1\tphone_2\tby\tscore\n");
    for ((phone_1, phone_2, by), (sum, n)) in groups {
        writeln!(table, "{phone_1}\t{phone_2}\t{by}\t{}", sum / n as f64)
            .expect("writing to a String cannot fail");
    }

    fs::write(output, table)
        .with_context(|| format!("could not write analysis artifact {}", output.display()))?;
    Ok(())
}

/// Pairs are stored once, under their lexicographically ordered key.
fn ordered_pair(x: &str, y: &str) -> (String, String) {
    if x <= y {
        (x.to_string(), y.to_string())
    } else {
        (y.to_string(), x.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FEATURES_GROUP;
    use crate::registry::DistanceRegistry;
    use crate::stages::ingest;
    use tempfile::tempdir;

    fn write_task_file(path: &Path) {
        let definition = TaskDefinition {
            triplets: vec![
                Triplet {
                    anchor: "a1".to_string(),
                    same: "a2".to_string(),
                    different: "b1".to_string(),
                    phone_1: "a".to_string(),
                    phone_2: "b".to_string(),
                    by: "ctx".to_string(),
                },
                Triplet {
                    anchor: "b1".to_string(),
                    same: "b2".to_string(),
                    different: "a1".to_string(),
                    phone_1: "a".to_string(),
                    phone_2: "b".to_string(),
                    by: "ctx".to_string(),
                },
            ],
        };
        fs::write(path, serde_json::to_vec(&definition).unwrap()).unwrap();
    }

    /// Two well-separated classes: the a* items point one way, the b* items
    /// the other.
    fn write_features(dir: &Path) {
        fs::write(dir.join("a1.fea"), "0.0 1.0 0.0\n0.1 1.0 0.1\n").unwrap();
        fs::write(dir.join("a2.fea"), "0.0 1.0 0.1\n0.1 1.0 0.0\n").unwrap();
        fs::write(dir.join("b1.fea"), "0.0 0.0 1.0\n0.1 0.1 1.0\n").unwrap();
        fs::write(dir.join("b2.fea"), "0.0 0.1 1.0\n0.1 0.0 1.0\n").unwrap();
    }

    #[test]
    fn test_stage_chain_end_to_end() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("feats");
        fs::create_dir(&input).unwrap();
        write_features(&input);

        let features = dir.path().join("features.json");
        let task_file = dir.path().join("task.json");
        let distances = dir.path().join("distances.json");
        let scores = dir.path().join("scores.json");
        let analysis = dir.path().join("analysis.tsv");

        write_task_file(&task_file);
        ingest::ingest_folder(&input, &features).unwrap();

        let registry = DistanceRegistry::with_defaults();
        let entry = registry.resolve("dtw_cosine").unwrap();
        compute_distances(&features, FEATURES_GROUP, &task_file, &distances, entry, true, 2)
            .unwrap();

        let rows: Vec<PairDistance> =
            serde_json::from_slice(&fs::read(&distances).unwrap()).unwrap();
        // Three unique pairs: the two triplets share the cross pair.
        assert_eq!(rows.len(), 3);

        score_triplets(&task_file, &distances, &scores).unwrap();
        analyze_scores(&task_file, &scores, &analysis).unwrap();

        let table = fs::read_to_string(&analysis).unwrap();
        // Both triplets are discriminated correctly: mean error 0.
        assert_eq!(table, "phone_1\tphone_2\tby\tscore\na\tb\tctx\t0\n");
    }

    #[test]
    fn test_read_task_definition_rejects_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("task.json");
        fs::write(&path, r#"{"triplets": []}"#).unwrap();
        assert!(read_task_definition(&path).is_err());
    }

    #[test]
    fn test_compute_distances_missing_item() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("feats");
        fs::create_dir(&input).unwrap();
        // Only the a* items exist; the task also references b1/b2.
        fs::write(input.join("a1.fea"), "0.0 1.0\n0.1 1.0\n").unwrap();
        fs::write(input.join("a2.fea"), "0.0 1.0\n0.1 1.0\n").unwrap();

        let features = dir.path().join("features.json");
        let task_file = dir.path().join("task.json");
        write_task_file(&task_file);
        ingest::ingest_folder(&input, &features).unwrap();

        let registry = DistanceRegistry::with_defaults();
        let entry = registry.resolve("dtw_cosine").unwrap();
        let err = compute_distances(
            &features,
            FEATURES_GROUP,
            &task_file,
            &dir.path().join("distances.json"),
            entry,
            true,
            1,
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing from the feature artifact"));
    }

    #[test]
    fn test_score_detects_confusion() {
        let dir = tempdir().unwrap();
        let task_file = dir.path().join("task.json");
        write_task_file(&task_file);

        // Distances that put the anchor closer to the different class.
        let rows = vec![
            PairDistance { a: "a1".into(), b: "a2".into(), distance: 0.9 },
            PairDistance { a: "a1".into(), b: "b1".into(), distance: 0.1 },
            PairDistance { a: "b1".into(), b: "b2".into(), distance: 0.9 },
        ];
        let distances = dir.path().join("distances.json");
        fs::write(&distances, serde_json::to_vec(&rows).unwrap()).unwrap();

        let scores_path = dir.path().join("scores.json");
        score_triplets(&task_file, &distances, &scores_path).unwrap();
        let scores: Vec<ScoreRow> =
            serde_json::from_slice(&fs::read(&scores_path).unwrap()).unwrap();
        assert_eq!(scores.len(), 2);
        // Both anchors sit closer to the wrong class.
        assert_eq!(scores[0].score, 1.0);
        assert_eq!(scores[1].score, 1.0);
    }
}

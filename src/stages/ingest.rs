//! Feature ingestion: converts a folder of per-item text feature files into
//! one feature artifact.
//!
//! Each input file is a whitespace-separated 2-D numeric table whose first
//! column is time and whose remaining columns are the feature dimensions.
//! Anything that does not parse as such a table is rejected loudly, naming
//! the file; a silently skipped item would change the evaluation result.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use anyhow::{bail, ensure, Context};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::pipeline::FEATURES_GROUP;

/// One item's features: a time axis and a (frames x dims) matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Frame timestamps, one per row of `frames`.
    pub times: Vec<f64>,
    /// Feature frames.
    pub frames: Array2<f64>,
}

/// The feature artifact payload: group key -> item name -> record.
pub type FeatureArchive = BTreeMap<String, BTreeMap<String, FeatureRecord>>;

/// Parses one raw feature file.
///
/// # Errors
///
/// Fails for fewer than two rows (a 1-D table), ragged rows, fewer than two
/// columns, or any non-numeric token.
pub fn load_feature_file(path: &Path) -> anyhow::Result<FeatureRecord> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("error when accessing features file {}", path.display()))?;

    let mut times = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut values = Vec::new();
        for token in line.split_whitespace() {
            let value: f64 = token.parse().with_context(|| {
                format!(
                    "non-numeric value '{}' at line {} of {}",
                    token,
                    idx + 1,
                    path.display()
                )
            })?;
            values.push(value);
        }
        ensure!(
            values.len() >= 2,
            "line {} of {} has no feature columns",
            idx + 1,
            path.display()
        );
        if let Some(first) = rows.first() {
            ensure!(
                values.len() == first.len() + 1,
                "ragged row at line {} of {}: expected {} columns, got {}",
                idx + 1,
                path.display(),
                first.len() + 1,
                values.len()
            );
        }
        times.push(values[0]);
        rows.push(values[1..].to_vec());
    }

    ensure!(
        rows.len() >= 2,
        "only one line was found in {}",
        path.display()
    );

    let dims = rows[0].len();
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    let frames = Array2::from_shape_vec((times.len(), dims), flat)
        .context("feature rows do not form a matrix")?;
    Ok(FeatureRecord { times, frames })
}

/// Ingests every file directly inside `input_folder` into a feature artifact
/// at `output`, keyed by file stem under the default group.
pub fn ingest_folder(input_folder: &Path, output: &Path) -> anyhow::Result<()> {
    let mut items: BTreeMap<String, FeatureRecord> = BTreeMap::new();

    let mut entries: Vec<_> = WalkDir::new(input_folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .collect::<Result<_, _>>()
        .with_context(|| format!("could not list feature folder {}", input_folder.display()))?;
    entries.sort_by(|a, b| a.file_name().cmp(b.file_name()));

    for entry in entries {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let item = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .with_context(|| format!("unusable feature file name {}", path.display()))?;
        debug!(item = %item, "loading features");
        let record = load_feature_file(path)?;
        if items.insert(item.clone(), record).is_some() {
            bail!("duplicate feature item '{item}' in {}", input_folder.display());
        }
    }

    if items.is_empty() {
        bail!("feature folder {} holds no files", input_folder.display());
    }

    let mut archive = FeatureArchive::new();
    archive.insert(FEATURES_GROUP.to_string(), items);

    let file = File::create(output)
        .with_context(|| format!("could not create feature artifact {}", output.display()))?;
    serde_json::to_writer(BufWriter::new(file), &archive)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_feature_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("item1.fea");
        fs::write(&path, "0.00 1.0 2.0\n0.01 3.0 4.0\n0.02 5.0 6.0\n").unwrap();

        let record = load_feature_file(&path).unwrap();
        assert_eq!(record.times, vec![0.00, 0.01, 0.02]);
        assert_eq!(record.frames.shape(), &[3, 2]);
        assert_eq!(record.frames[[1, 0]], 3.0);
    }

    #[test]
    fn test_load_rejects_single_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("one.fea");
        fs::write(&path, "0.00 1.0 2.0\n").unwrap();
        let err = load_feature_file(&path).unwrap_err();
        assert!(err.to_string().contains("only one line"));
    }

    #[test]
    fn test_load_rejects_ragged_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ragged.fea");
        fs::write(&path, "0.0 1.0 2.0\n0.1 3.0\n").unwrap();
        assert!(load_feature_file(&path).is_err());
    }

    #[test]
    fn test_load_rejects_missing_feature_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("times_only.fea");
        fs::write(&path, "0.0\n0.1\n").unwrap();
        assert!(load_feature_file(&path).is_err());
    }

    #[test]
    fn test_load_rejects_non_numeric() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("text.fea");
        fs::write(&path, "0.0 1.0\nnot a number\n").unwrap();
        let err = load_feature_file(&path).unwrap_err();
        assert!(err.to_string().contains("non-numeric"));
    }

    #[test]
    fn test_ingest_folder() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("feats");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("a.fea"), "0.0 1.0\n0.1 2.0\n").unwrap();
        fs::write(input.join("b.fea"), "0.0 3.0\n0.1 4.0\n").unwrap();

        let output = dir.path().join("features.json");
        ingest_folder(&input, &output).unwrap();

        let archive: FeatureArchive =
            serde_json::from_slice(&fs::read(&output).unwrap()).unwrap();
        let group = &archive[FEATURES_GROUP];
        assert_eq!(group.len(), 2);
        assert!(group.contains_key("a"));
        assert!(group.contains_key("b"));
    }

    #[test]
    fn test_ingest_folder_fails_on_bad_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("feats");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("good.fea"), "0.0 1.0\n0.1 2.0\n").unwrap();
        fs::write(input.join("bad.fea"), "just text\n").unwrap();

        let output = dir.path().join("features.json");
        let err = ingest_folder(&input, &output).unwrap_err();
        assert!(err.to_string().contains("bad.fea"));
    }
}

//! Task specification: one resolved, normalized evaluation unit.
//!
//! A [`TaskSpec`] is built from one config section merged with the `general`
//! defaults. Axis fields are opaque strings handed through to the stage
//! adapters; the orchestrator only uses them to form the canonical spec
//! string that fingerprints the score and analyze artifacts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::error::ConfigError;

/// Config keys that must be present and non-empty for every task.
const REQUIRED_PATH_KEYS: [&str; 6] = [
    "featurefile",
    "taskfile",
    "distancefile",
    "scorefile",
    "analyzefile",
    "outputfile",
];

/// A resolved description of one evaluation unit.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Section name, unique within a batch.
    pub section: String,

    /// Attribute being discriminated.
    pub on: Option<String>,
    /// Attributes defining comparison buckets (whitespace-separated list).
    pub across: Option<String>,
    /// Attributes further conditioning comparisons (whitespace-separated list).
    pub by: Option<String>,
    /// Filter expressions, passed through verbatim.
    pub filters: Option<String>,
    /// Regressor expressions, passed through verbatim.
    pub regressors: Option<String>,
    /// Sampling expression, passed through verbatim.
    pub sampling: Option<String>,

    /// Task topology (`within` or `across`); parsed at aggregation time.
    pub task_type: Option<String>,
    /// Registry key of the distance function to use, if configured.
    pub distance: Option<String>,
    /// Degree-of-parallelism hint for the distance adapter.
    pub workers: usize,

    /// Feature artifact path (transient).
    pub feature_file: PathBuf,
    /// Distance artifact path (transient).
    pub distance_file: PathBuf,
    /// Score artifact path (transient).
    pub score_file: PathBuf,
    /// Analysis artifact path (retained only with the keep policy).
    pub analyze_file: PathBuf,
    /// Triplet/task definition file (input, never written).
    pub task_file: PathBuf,
    /// Batch results file.
    pub output_file: PathBuf,
}

impl TaskSpec {
    /// Resolves a merged config section into a task specification.
    ///
    /// Artifact and output paths resolve against the output directory; the
    /// task definition file resolves against the config file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingKey`] if any required path key is absent
    /// or empty, and [`ConfigError::InvalidValue`] for a bad worker count.
    pub fn resolve(
        section: &str,
        items: &HashMap<String, String>,
        app: &AppConfig,
    ) -> Result<Self, ConfigError> {
        for key in REQUIRED_PATH_KEYS {
            match items.get(key) {
                Some(value) if !value.trim().is_empty() => {}
                _ => {
                    return Err(ConfigError::MissingKey {
                        section: section.to_string(),
                        key: key.to_string(),
                    })
                }
            }
        }

        let workers = match items.get("workers") {
            None => 1,
            Some(raw) => {
                raw.trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        section: section.to_string(),
                        key: "workers".to_string(),
                        message: format!("expected a positive integer, got '{raw}'"),
                    })?
            }
        };

        let out = |key: &str| app.output_dir.join(&items[key]);

        Ok(Self {
            section: section.to_string(),
            on: opt(items, "on"),
            across: opt(items, "across"),
            by: opt(items, "by"),
            filters: opt(items, "filters"),
            regressors: opt(items, "regressors"),
            sampling: opt(items, "sampling"),
            task_type: opt(items, "type"),
            distance: opt(items, "distance"),
            workers,
            feature_file: out("featurefile"),
            distance_file: out("distancefile"),
            score_file: out("scorefile"),
            analyze_file: out("analyzefile"),
            task_file: app.config_dir.join(&items["taskfile"]),
            output_file: out("outputfile"),
        })
    }

    /// Canonical string identifying what was asked of the score and analyze
    /// stages.
    ///
    /// Axis labels are always present; each value follows its label only when
    /// set and non-empty. Two specs differing in any axis field therefore
    /// produce different strings.
    pub fn canonical_spec_string(&self) -> String {
        let fields: [(&str, &Option<String>); 6] = [
            ("on", &self.on),
            ("across", &self.across),
            ("by", &self.by),
            ("filters", &self.filters),
            ("regressors", &self.regressors),
            ("sampling", &self.sampling),
        ];

        let mut parts: Vec<&str> = Vec::new();
        for (label, value) in fields {
            parts.push(label);
            if let Some(v) = value {
                if !v.is_empty() {
                    parts.push(v);
                }
            }
        }
        parts.join(" ")
    }

    /// The four stage artifact paths, in pipeline order.
    pub fn artifact_paths(&self) -> [&Path; 4] {
        [
            &self.feature_file,
            &self.distance_file,
            &self.score_file,
            &self.analyze_file,
        ]
    }
}

fn opt(items: &HashMap<String, String>, key: &str) -> Option<String> {
    items.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

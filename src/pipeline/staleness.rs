//! Staleness oracle: decides per stage whether a cached artifact is
//! reusable.
//!
//! Every probe is pessimistic. A missing file, an unreadable modification
//! time, an absent or corrupt completion footer all read as stale; the
//! pipeline recomputes rather than ever reusing a possibly invalid cache.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::registry::DistanceEntry;
use crate::storage;

/// Whether the ingestion stage must run.
///
/// Stale if the feature artifact does not exist or any file directly inside
/// the input folder is newer than it. An empty or unreadable input folder is
/// rejected by the batch driver before the pipeline runs; here it simply
/// reads as stale.
pub fn ingest_is_stale(input_folder: &Path, feature_file: &Path) -> bool {
    let Some(output_time) = storage::mtime(feature_file) else {
        return true;
    };

    let Ok(entries) = fs::read_dir(input_folder) else {
        return true;
    };
    for entry in entries {
        let newer = entry
            .ok()
            .and_then(|e| e.metadata().ok())
            .and_then(|m| m.modified().ok())
            .map(|input_time| input_time > output_time)
            // Unreadable input mtime: recompute.
            .unwrap_or(true);
        if newer {
            return true;
        }
    }
    false
}

/// Whether the distance stage must run.
///
/// Fresh only when the artifact carries a done completion footer whose
/// fingerprint equals the resolved entry's identity tag.
pub fn distance_is_stale(distance_file: &Path, entry: &DistanceEntry) -> bool {
    match storage::read_completion(distance_file) {
        Some(completion) => {
            !completion.done || completion.fingerprint.as_deref() != Some(entry.fingerprint().as_str())
        }
        None => true,
    }
}

/// Whether a spec-fingerprinted stage (score or analyze) must run.
///
/// When a done artifact carries a different fingerprint, the task
/// specification changed since it was cached; that is worth a warning, a
/// plain cache miss is not.
pub fn spec_is_stale(path: &Path, spec_string: &str) -> bool {
    match storage::read_completion(path) {
        Some(completion) => {
            if !completion.done {
                return true;
            }
            if completion.fingerprint.as_deref() != Some(spec_string) {
                warn!(
                    artifact = %path.display(),
                    "task specification changed since this artifact was cached, recomputing"
                );
                return true;
            }
            false
        }
        None => true,
    }
}

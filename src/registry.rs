//! Distance-function registry.
//!
//! Maps a stable string key to a typed distance function plus an identity
//! tag. The tag, not the function body, is what fingerprints the distance
//! artifact: two runs reuse a cached distance table only when the resolved
//! entry carries the same `key@version` identity.

use std::collections::HashMap;

use ndarray::Array2;

use crate::error::RegistryError;
use crate::stages::metrics;

/// Registry key of the distance used when neither the CLI nor the task
/// section names one.
pub const DEFAULT_DISTANCE: &str = "dtw_cosine";

/// A frame-sequence distance: two (frames x dims) matrices in, one scalar
/// out. The flag requests path-length normalization where the metric
/// supports it.
pub type DistanceFn = fn(&Array2<f64>, &Array2<f64>, bool) -> f64;

/// One registered distance implementation.
#[derive(Clone)]
pub struct DistanceEntry {
    /// Registry key.
    pub key: String,
    /// Implementation version, bumped whenever the numeric behavior changes.
    pub version: String,
    /// The distance function itself.
    pub func: DistanceFn,
}

impl DistanceEntry {
    /// Identity tag stored in the distance artifact's completion footer.
    pub fn fingerprint(&self) -> String {
        format!("{}@{}", self.key, self.version)
    }
}

impl std::fmt::Debug for DistanceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistanceEntry")
            .field("key", &self.key)
            .field("version", &self.version)
            .finish()
    }
}

/// Registry of available distance functions, populated at startup.
#[derive(Debug)]
pub struct DistanceRegistry {
    entries: HashMap<String, DistanceEntry>,
}

impl DistanceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Creates a registry holding the built-in metrics.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register("dtw_cosine", "1.0", metrics::dtw_cosine)
            .and_then(|r| r.register("kl_divergence", "1.0", metrics::dtw_kl_divergence))
            .expect("built-in distance keys are unique");
        registry
    }

    /// Registers a distance function under a key.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateDistance`] if the key is taken.
    pub fn register(
        &mut self,
        key: &str,
        version: &str,
        func: DistanceFn,
    ) -> Result<&mut Self, RegistryError> {
        if self.entries.contains_key(key) {
            return Err(RegistryError::DuplicateDistance(key.to_string()));
        }
        self.entries.insert(
            key.to_string(),
            DistanceEntry {
                key: key.to_string(),
                version: version.to_string(),
                func,
            },
        );
        Ok(self)
    }

    /// Looks up a distance function by key.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownDistance`] if no entry matches.
    pub fn resolve(&self, key: &str) -> Result<&DistanceEntry, RegistryError> {
        self.entries
            .get(key)
            .ok_or_else(|| RegistryError::UnknownDistance(key.to_string()))
    }

    /// Registered keys, sorted for stable display.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl Default for DistanceRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

//! Error types for abx-eval operations.
//!
//! Defines error types for the major subsystems:
//! - Batch configuration parsing and validation
//! - Distance-function registry resolution
//! - Artifact storage and cleanup
//! - Score aggregation
//! - Batch result output
//!
//! The pipeline-level error (`PipelineError`) lives next to the orchestrator
//! in [`crate::pipeline`].

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading the batch configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Missing 'general' section in config file")]
    MissingGeneralSection,

    #[error("Malformed config line {line}: {content}")]
    MalformedLine { line: usize, content: String },

    #[error("Task '{section}' is missing required key '{key}'")]
    MissingKey { section: String, key: String },

    #[error("Invalid value for '{key}' in task '{section}': {message}")]
    InvalidValue {
        section: String,
        key: String,
        message: String,
    },

    #[error("Config file defines no task sections")]
    NoTasks,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while resolving a distance function.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Distance '{0}' not found in registry")]
    UnknownDistance(String),

    #[error("Distance '{0}' already registered")]
    DuplicateDistance(String),
}

/// Errors that can occur in the artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to create directories for {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while collapsing the analysis table into a score.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Malformed 'by' field {value:?}: {message}")]
    MalformedBy { value: String, message: String },

    #[error("Malformed analysis row {line}: {message}")]
    MalformedRow { line: usize, message: String },

    #[error("Analysis table has no rows")]
    EmptyTable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while writing the batch results.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Could not write results file {path}: {source}")]
    ResultsWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not write version marker {path}: {source}")]
    VersionMarker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

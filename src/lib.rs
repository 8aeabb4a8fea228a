//! abx-eval: incremental ABX discrimination evaluation pipeline.
//!
//! Turns a folder of per-item feature vectors into one aggregate
//! discrimination score per configured task, through a fixed chain of
//! stages (ingest, distance, score, analyze) with staleness-aware artifact
//! caching and guaranteed cleanup of transient artifacts.

// Core modules
pub mod aggregate;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod stages;
pub mod storage;
pub mod task;

// Re-export commonly used error types
pub use error::{AggregateError, ConfigError, OutputError, RegistryError, StoreError};
pub use pipeline::PipelineError;

//! SentiLab Runner: configuration, data loading, result tables, orchestration.
//!
//! This crate builds on `sentilab-core` to provide:
//! - TOML analysis configuration with validation
//! - Merged-table loading into per-ticker series with a dataset hash
//! - Causality and comparison CSV tables
//! - Run manifest (JSON) with skipped instruments
//! - Orchestrator: Granger stage, working set, parallel order search and comparison

pub mod config;
pub mod data_loader;
pub mod manifest;
pub mod orchestrator;
pub mod persistence;

pub use config::{AnalysisConfig, ConfigError, EconometricsConfig, PathsConfig};
pub use data_loader::{load_merged, LoadError, MergedTable};
pub use manifest::{RunManifest, SkipRecord};
pub use orchestrator::{
    run_comparison, run_granger, run_pipeline, InstrumentOutcome, RunError, RunSummary, Skip,
    SkipReason, SkipStage, WorkingSet,
};
pub use persistence::{ComparisonResult, PersistError};

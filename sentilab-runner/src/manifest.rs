//! Run manifest export (JSON).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::orchestrator::Skip;
use crate::persistence::PersistError;

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// A skipped instrument as recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub ticker: String,
    pub stage: String,
    pub reason: String,
}

impl From<&Skip> for SkipRecord {
    fn from(skip: &Skip) -> Self {
        Self {
            ticker: skip.ticker.clone(),
            stage: skip.stage.to_string(),
            reason: skip.reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub dataset_hash: String,
    pub config: AnalysisConfig,
    pub instruments_loaded: usize,
    /// Rows in the causality table; `None` when the Granger stage did not run.
    pub causality_rows: Option<usize>,
    pub working_set: Vec<String>,
    /// True when the working set fell back to every loaded ticker.
    pub working_set_fallback: bool,
    pub recorded: usize,
    pub skipped: Vec<SkipRecord>,
}

pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<(), PersistError> {
    let json = serde_json::to_string_pretty(manifest)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| PersistError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, json).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_manifest(path: &Path) -> Result<RunManifest, PersistError> {
    let text = std::fs::read_to_string(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

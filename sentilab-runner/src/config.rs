//! Analysis configuration loaded from TOML.
//!
//! Built once per run and passed by reference; nothing mutates it afterwards.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sentilab_core::arma::FitOptions;

/// File name of the causality table inside `output_dir`.
pub const CAUSALITY_FILE: &str = "granger_results.csv";
/// File name of the comparison table inside `output_dir`.
pub const COMPARISON_FILE: &str = "arimax_results.csv";
/// File name of the run manifest inside `output_dir`.
pub const MANIFEST_FILE: &str = "run_manifest.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub paths: PathsConfig,
    pub econometrics: EconometricsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Merged per-ticker table produced upstream.
    pub merged: PathBuf,
    /// Directory for the causality and comparison tables and the manifest.
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            merged: PathBuf::from("data/processed/merged.csv"),
            output_dir: PathBuf::from("data/processed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconometricsConfig {
    pub max_lag_days: usize,
    pub significance_level: f64,
    pub max_p: usize,
    pub max_q: usize,
    pub train_fraction: f64,
    /// Minimum aligned rows for the order search and model comparison.
    pub min_observations: usize,
    /// Per-fit optimizer budget.
    pub max_optimizer_iterations: usize,
    /// Worker threads; 0 uses one per core.
    pub workers: usize,
}

impl Default for EconometricsConfig {
    fn default() -> Self {
        Self {
            max_lag_days: 5,
            significance_level: 0.05,
            max_p: 3,
            max_q: 3,
            train_fraction: 0.8,
            min_observations: 30,
            max_optimizer_iterations: FitOptions::default().max_iterations,
            workers: 0,
        }
    }
}

impl AnalysisConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string. Missing fields take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.econometrics;
        if e.max_lag_days == 0 {
            return Err(ConfigError::Invalid("max_lag_days must be at least 1".into()));
        }
        if !(e.significance_level > 0.0 && e.significance_level < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "significance_level must be in (0, 1), got {}",
                e.significance_level
            )));
        }
        if !(e.train_fraction > 0.0 && e.train_fraction < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "train_fraction must be in (0, 1), got {}",
                e.train_fraction
            )));
        }
        if e.max_p == 0 && e.max_q == 0 {
            return Err(ConfigError::Invalid(
                "max_p and max_q cannot both be 0".into(),
            ));
        }
        if e.max_optimizer_iterations == 0 {
            return Err(ConfigError::Invalid(
                "max_optimizer_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            max_iterations: self.econometrics.max_optimizer_iterations,
        }
    }

    pub fn causality_path(&self) -> PathBuf {
        self.paths.output_dir.join(CAUSALITY_FILE)
    }

    pub fn comparison_path(&self) -> PathBuf {
        self.paths.output_dir.join(COMPARISON_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.paths.output_dir.join(MANIFEST_FILE)
    }
}

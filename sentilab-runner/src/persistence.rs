//! Causality and comparison tables (CSV).
//!
//! Both tables always carry a header, even when empty, so a later stage can
//! tell "no results" apart from "never produced".

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::info;

use sentilab_core::arma::ArmaOrder;
use sentilab_core::granger::CausalityResult;

pub const CAUSALITY_COLUMNS: [&str; 6] = [
    "ticker",
    "lag_days",
    "f_statistic",
    "p_value",
    "significant",
    "interpretation",
];

pub const COMPARISON_COLUMNS: [&str; 12] = [
    "ticker",
    "order",
    "best_sentiment_lag",
    "arima_aic",
    "arimax_aic",
    "arima_rmse",
    "arimax_rmse",
    "rmse_improvement_pct",
    "sentiment_coef",
    "sentiment_pvalue",
    "n_train",
    "n_test",
];

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to serialize manifest: {0}")]
    Json(#[from] serde_json::Error),
}

/// One row of the comparison table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub ticker: String,
    #[serde(serialize_with = "serialize_order", deserialize_with = "deserialize_order")]
    pub order: ArmaOrder,
    pub best_sentiment_lag: usize,
    pub arima_aic: f64,
    pub arimax_aic: f64,
    pub arima_rmse: f64,
    pub arimax_rmse: f64,
    pub rmse_improvement_pct: f64,
    pub sentiment_coef: f64,
    pub sentiment_pvalue: f64,
    pub n_train: usize,
    pub n_test: usize,
}

fn serialize_order<S: Serializer>(order: &ArmaOrder, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(order)
}

fn deserialize_order<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ArmaOrder, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_order(&raw).ok_or_else(|| de::Error::custom(format!("invalid order '{raw}'")))
}

/// Parse `"(p, d, q)"`.
pub fn parse_order(raw: &str) -> Option<ArmaOrder> {
    let inner = raw.trim().strip_prefix('(')?.strip_suffix(')')?;
    let parts = inner
        .split(',')
        .map(|s| s.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    match parts.as_slice() {
        [p, 0, q] => Some(ArmaOrder::new(*p, *q)),
        _ => None,
    }
}

/// Causality rows as stored. `significant` also accepts `True`/`False`.
#[derive(Debug, Serialize, Deserialize)]
struct CausalityRow {
    ticker: String,
    lag_days: usize,
    f_statistic: f64,
    p_value: f64,
    #[serde(deserialize_with = "deserialize_flag")]
    significant: bool,
    interpretation: String,
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(de::Error::custom(format!("invalid boolean '{raw}'"))),
    }
}

impl From<&CausalityResult> for CausalityRow {
    fn from(r: &CausalityResult) -> Self {
        Self {
            ticker: r.ticker.clone(),
            lag_days: r.lag_days,
            f_statistic: r.f_statistic,
            p_value: r.p_value,
            significant: r.significant,
            interpretation: r.interpretation.clone(),
        }
    }
}

impl From<CausalityRow> for CausalityResult {
    fn from(r: CausalityRow) -> Self {
        Self {
            ticker: r.ticker,
            lag_days: r.lag_days,
            f_statistic: r.f_statistic,
            p_value: r.p_value,
            significant: r.significant,
            interpretation: r.interpretation,
        }
    }
}

fn create_parent(path: &Path) -> Result<(), PersistError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| PersistError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn write_table<T: Serialize>(
    path: &Path,
    columns: &[&str],
    rows: &[T],
) -> Result<(), PersistError> {
    create_parent(path)?;
    let csv_err = |source| PersistError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    writer.write_record(columns).map_err(csv_err)?;
    for row in rows {
        writer.serialize(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn read_table<T: de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, PersistError> {
    let csv_err = |source| PersistError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(csv_err)
}

pub fn write_causality_table(path: &Path, results: &[CausalityResult]) -> Result<(), PersistError> {
    let rows: Vec<CausalityRow> = results.iter().map(CausalityRow::from).collect();
    write_table(path, &CAUSALITY_COLUMNS, &rows)?;
    info!(path = %path.display(), rows = rows.len(), "causality table written");
    Ok(())
}

pub fn read_causality_table(path: &Path) -> Result<Vec<CausalityResult>, PersistError> {
    let rows: Vec<CausalityRow> = read_table(path)?;
    Ok(rows.into_iter().map(CausalityResult::from).collect())
}

pub fn write_comparison_table(
    path: &Path,
    results: &[ComparisonResult],
) -> Result<(), PersistError> {
    write_table(path, &COMPARISON_COLUMNS, results)?;
    info!(path = %path.display(), rows = results.len(), "comparison table written");
    Ok(())
}

pub fn read_comparison_table(path: &Path) -> Result<Vec<ComparisonResult>, PersistError> {
    read_table(path)
}

//! Pipeline orchestration: Granger sweep, working set, order search, comparison.
//!
//! Stages:
//! 1. Load the merged table (missing file is fatal).
//! 2. Granger sweep over every ticker; the causality table is persisted.
//! 3. The causality table is re-read from disk and reduced to a working set.
//! 4. Per working-set ticker, in parallel: lag resolution, sufficiency check,
//!    order search, baseline vs augmented comparison.
//! 5. Comparison table and run manifest are written.
//!
//! Per-instrument failures never abort the run; they become `Skip` entries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use chrono::Utc;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use sentilab_core::arma::{ArmaOrder, FitFailure};
use sentilab_core::comparison::{compare, ComparisonFailure, ComparisonMetrics, ModelStage};
use sentilab_core::granger::{test_all, CausalityBatch, CausalityError, CausalityResult};
use sentilab_core::order_selection::select_order;
use sentilab_core::series::{InstrumentSeries, SentimentLag};

use crate::config::{AnalysisConfig, ConfigError};
use crate::data_loader::{load_merged, LoadError, MergedTable};
use crate::manifest::{write_manifest, RunManifest, SkipRecord, SCHEMA_VERSION};
use crate::persistence::{
    read_causality_table, write_causality_table, write_comparison_table, ComparisonResult,
    PersistError,
};

/// Run-level errors. Any of these stops the run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("required input missing: {path}")]
    MissingInputArtifact { path: PathBuf },
    #[error("data error: {0}")]
    Load(#[from] LoadError),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Where in the per-instrument pipeline a ticker was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipStage {
    Granger,
    LagResolution,
    Sufficiency,
    Split,
    BaselineFit,
    AugmentedFit,
}

impl From<ModelStage> for SkipStage {
    fn from(stage: ModelStage) -> Self {
        match stage {
            ModelStage::Split => SkipStage::Split,
            ModelStage::BaselineFit => SkipStage::BaselineFit,
            ModelStage::AugmentedFit => SkipStage::AugmentedFit,
        }
    }
}

impl fmt::Display for SkipStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SkipStage::Granger => "granger",
            SkipStage::LagResolution => "lag_resolution",
            SkipStage::Sufficiency => "sufficiency",
            SkipStage::Split => "split",
            SkipStage::BaselineFit => "baseline_fit",
            SkipStage::AugmentedFit => "augmented_fit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error(transparent)]
    Causality(#[from] CausalityError),
    #[error("insufficient data: {n} rows < {required} required")]
    InsufficientData { n: usize, required: usize },
    #[error("column '{column}' missing from merged table")]
    MissingLagColumn { column: String },
    #[error(transparent)]
    Fit(#[from] FitFailure),
}

/// A ticker dropped from the run, with the stage and reason.
#[derive(Debug, Clone, PartialEq)]
pub struct Skip {
    pub ticker: String,
    pub stage: SkipStage,
    pub reason: SkipReason,
}

impl Skip {
    fn new(ticker: &str, stage: SkipStage, reason: impl Into<SkipReason>) -> Self {
        Self {
            ticker: ticker.to_string(),
            stage,
            reason: reason.into(),
        }
    }
}

impl From<(String, CausalityError)> for Skip {
    fn from((ticker, e): (String, CausalityError)) -> Self {
        Self {
            ticker,
            stage: SkipStage::Granger,
            reason: SkipReason::Causality(e),
        }
    }
}

/// Per-instrument progress through the comparison pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentState {
    Loaded { rows: usize },
    SufficiencyChecked { n: usize, lag: SentimentLag },
    OrderSelected { order: ArmaOrder, aic: f64 },
    Compared,
    Skipped { stage: SkipStage },
    Recorded,
}

impl fmt::Display for InstrumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentState::Loaded { rows } => write!(f, "loaded ({rows} rows)"),
            InstrumentState::SufficiencyChecked { n, lag } => {
                write!(f, "sufficiency checked (n={n}, lag={lag})")
            }
            InstrumentState::OrderSelected { order, aic } => {
                write!(f, "order selected {order} (aic={aic:.2})")
            }
            InstrumentState::Compared => f.write_str("compared"),
            InstrumentState::Skipped { stage } => write!(f, "skipped at {stage}"),
            InstrumentState::Recorded => f.write_str("recorded"),
        }
    }
}

fn transition(ticker: &str, state: InstrumentState) {
    debug!(ticker, state = %state, "instrument state");
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentOutcome {
    Recorded(ComparisonResult),
    Skipped(Skip),
}

/// Tickers selected for the comparison stage.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingSet {
    /// Sorted.
    pub tickers: Vec<String>,
    /// True when no loaded ticker had a significant causality row.
    pub fallback: bool,
}

/// Tickers with at least one significant causality row, or every loaded ticker if none.
pub fn working_set(causality: &[CausalityResult], loaded: &[String]) -> WorkingSet {
    let loaded_set: BTreeSet<&str> = loaded.iter().map(String::as_str).collect();
    let significant: BTreeSet<String> = causality
        .iter()
        .filter(|r| r.significant && loaded_set.contains(r.ticker.as_str()))
        .map(|r| r.ticker.clone())
        .collect();

    if significant.is_empty() {
        let mut tickers = loaded.to_vec();
        tickers.sort();
        tickers.dedup();
        return WorkingSet {
            tickers,
            fallback: true,
        };
    }
    WorkingSet {
        tickers: significant.into_iter().collect(),
        fallback: false,
    }
}

/// Lag with the lowest p-value among the ticker's significant rows; lag 1 if none.
///
/// Ties keep the first row in table order.
pub fn best_lag(causality: &[CausalityResult], ticker: &str) -> usize {
    let mut best: Option<&CausalityResult> = None;
    for row in causality.iter().filter(|r| r.ticker == ticker && r.significant) {
        if best.map_or(true, |b| row.p_value < b.p_value) {
            best = Some(row);
        }
    }
    best.map_or(1, |r| r.lag_days)
}

/// Map a lag to a precomputed sentiment column.
///
/// Lags past the precomputed range fall back to lag 1. A lag inside the range
/// whose column is absent from the table is an error, never substituted.
pub fn resolve_lag(
    ticker: &str,
    lag: usize,
    available: &BTreeSet<SentimentLag>,
) -> Result<SentimentLag, SkipReason> {
    let resolved = match SentimentLag::new(lag) {
        Some(l) => l,
        None => {
            warn!(ticker, lag, "lag beyond precomputed sentiment columns, using lag 1");
            SentimentLag::ONE
        }
    };
    if !available.contains(&resolved) {
        return Err(SkipReason::MissingLagColumn {
            column: resolved.column_name(),
        });
    }
    Ok(resolved)
}

/// Order search and comparison for one ticker.
pub fn analyze_instrument(
    series: &InstrumentSeries,
    causality: &[CausalityResult],
    available: &BTreeSet<SentimentLag>,
    config: &AnalysisConfig,
) -> InstrumentOutcome {
    let ticker = series.ticker.as_str();
    let econ = &config.econometrics;
    let opts = config.fit_options();
    transition(ticker, InstrumentState::Loaded { rows: series.len() });

    let skip = |stage: SkipStage, reason: SkipReason| {
        warn!(ticker, %stage, reason = %reason, "instrument skipped");
        transition(ticker, InstrumentState::Skipped { stage });
        InstrumentOutcome::Skipped(Skip::new(ticker, stage, reason))
    };

    let lag = match resolve_lag(ticker, best_lag(causality, ticker), available) {
        Ok(lag) => lag,
        Err(reason) => return skip(SkipStage::LagResolution, reason),
    };

    let pairs = series.return_lagged_sentiment_pairs(lag);
    if pairs.len() < econ.min_observations {
        return skip(
            SkipStage::Sufficiency,
            SkipReason::InsufficientData {
                n: pairs.len(),
                required: econ.min_observations,
            },
        );
    }
    transition(ticker, InstrumentState::SufficiencyChecked { n: pairs.len(), lag });
    info!(ticker, best_lag = lag.get(), n = pairs.len(), "model comparison");

    let selection = select_order(&pairs.target, econ.max_p, econ.max_q, &opts);
    if selection.degraded() {
        warn!(
            ticker,
            candidates = selection.candidates,
            "order selection degraded, using {}",
            selection.order
        );
    }
    transition(
        ticker,
        InstrumentState::OrderSelected {
            order: selection.order,
            aic: selection.aic,
        },
    );

    let metrics = match compare(
        &pairs.target,
        &pairs.exog,
        selection.order,
        econ.train_fraction,
        &opts,
    ) {
        Ok(m) => m,
        Err(ComparisonFailure { stage, failure }) => {
            return skip(stage.into(), SkipReason::Fit(failure))
        }
    };
    transition(ticker, InstrumentState::Compared);

    log_metrics(ticker, &metrics);
    let row = comparison_row(ticker, lag, &metrics);
    transition(ticker, InstrumentState::Recorded);
    InstrumentOutcome::Recorded(row)
}

fn log_metrics(ticker: &str, m: &ComparisonMetrics) {
    info!(ticker, order = %m.order, aic = m.baseline_aic, rmse = m.baseline_rmse, "ARMA");
    info!(ticker, order = %m.order, aic = m.augmented_aic, rmse = m.augmented_rmse, "ARMAX");
    let verdict = if m.exogenous_significant() {
        "sentiment significant"
    } else {
        "sentiment not significant"
    };
    info!(
        ticker,
        improvement_pct = m.rmse_improvement_pct,
        coef = m.exogenous_coefficient,
        p = m.exogenous_pvalue,
        "{verdict}"
    );
}

fn comparison_row(ticker: &str, lag: SentimentLag, m: &ComparisonMetrics) -> ComparisonResult {
    ComparisonResult {
        ticker: ticker.to_string(),
        order: m.order,
        best_sentiment_lag: lag.get(),
        arima_aic: m.baseline_aic,
        arimax_aic: m.augmented_aic,
        arima_rmse: m.baseline_rmse,
        arimax_rmse: m.augmented_rmse,
        rmse_improvement_pct: m.rmse_improvement_pct,
        sentiment_coef: m.exogenous_coefficient,
        sentiment_pvalue: m.exogenous_pvalue,
        n_train: m.n_train,
        n_test: m.n_test,
    }
}

/// Output of the Granger stage.
#[derive(Debug, Clone)]
pub struct GrangerOutput {
    pub results: Vec<CausalityResult>,
    pub skips: Vec<Skip>,
}

/// Output of the comparison stage.
#[derive(Debug, Clone)]
pub struct ComparisonOutput {
    /// Sorted by ticker.
    pub results: Vec<ComparisonResult>,
    pub skips: Vec<Skip>,
    pub working_set: WorkingSet,
}

/// Everything a run produced, as reported in the manifest.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub dataset_hash: String,
    pub instruments_loaded: usize,
    pub granger: Option<GrangerOutput>,
    pub comparison: Option<ComparisonOutput>,
}

fn build_pool(workers: usize) -> Result<rayon::ThreadPool, RunError> {
    Ok(rayon::ThreadPoolBuilder::new().num_threads(workers).build()?)
}

fn load_input(config: &AnalysisConfig) -> Result<MergedTable, RunError> {
    let path = &config.paths.merged;
    if !path.exists() {
        error!(
            path = %path.display(),
            "merged table missing; run the ingestion and sentiment stages first"
        );
        return Err(RunError::MissingInputArtifact { path: path.clone() });
    }
    Ok(load_merged(path)?)
}

fn granger_stage(
    config: &AnalysisConfig,
    table: &MergedTable,
    pool: &rayon::ThreadPool,
) -> Result<GrangerOutput, RunError> {
    let econ = &config.econometrics;
    info!(
        tickers = table.instruments.len(),
        max_lag = econ.max_lag_days,
        "Granger causality tests"
    );
    let pairs: BTreeMap<_, _> = table
        .instruments
        .iter()
        .map(|(ticker, series)| (ticker.clone(), series.return_sentiment_pairs()))
        .collect();

    let CausalityBatch { results, skipped } =
        pool.install(|| test_all(&pairs, econ.max_lag_days, econ.significance_level));

    if results.is_empty() {
        error!("no causality results");
    }
    write_causality_table(&config.causality_path(), &results)?;

    let significant: Vec<&CausalityResult> = results.iter().filter(|r| r.significant).collect();
    info!(
        significant = significant.len(),
        alpha = econ.significance_level,
        "Granger summary"
    );
    for r in &significant {
        info!(ticker = %r.ticker, lag = r.lag_days, p = r.p_value, "{}", r.interpretation);
    }

    Ok(GrangerOutput {
        results,
        skips: skipped.into_iter().map(Skip::from).collect(),
    })
}

fn comparison_stage(
    config: &AnalysisConfig,
    table: &MergedTable,
    pool: &rayon::ThreadPool,
) -> Result<ComparisonOutput, RunError> {
    let causality_path = config.causality_path();
    let causality = if causality_path.exists() {
        read_causality_table(&causality_path)?
    } else {
        warn!(path = %causality_path.display(), "causality table not found");
        Vec::new()
    };

    let working_set = working_set(&causality, &table.tickers());
    if working_set.fallback {
        warn!("no tickers with significant causality results, testing all");
    }
    info!(tickers = ?working_set.tickers, "model comparison working set");

    let outcomes: Vec<InstrumentOutcome> = pool.install(|| {
        working_set
            .tickers
            .par_iter()
            .filter_map(|ticker| table.instruments.get(ticker))
            .map(|series| analyze_instrument(series, &causality, &table.available_lags, config))
            .collect()
    });

    let mut results = Vec::new();
    let mut skips = Vec::new();
    for outcome in outcomes {
        match outcome {
            InstrumentOutcome::Recorded(row) => results.push(row),
            InstrumentOutcome::Skipped(skip) => skips.push(skip),
        }
    }
    results.sort_by(|a, b| a.ticker.cmp(&b.ticker));
    skips.sort_by(|a, b| a.ticker.cmp(&b.ticker));

    if results.is_empty() {
        error!("no comparison results");
    }
    write_comparison_table(&config.comparison_path(), &results)?;

    Ok(ComparisonOutput {
        results,
        skips,
        working_set,
    })
}

fn finish(config: &AnalysisConfig, summary: &RunSummary) -> Result<(), RunError> {
    let mut skipped: Vec<SkipRecord> = Vec::new();
    if let Some(g) = &summary.granger {
        skipped.extend(g.skips.iter().map(SkipRecord::from));
    }
    if let Some(c) = &summary.comparison {
        skipped.extend(c.skips.iter().map(SkipRecord::from));
    }
    let manifest = RunManifest {
        schema_version: SCHEMA_VERSION,
        created_at: Utc::now(),
        dataset_hash: summary.dataset_hash.clone(),
        config: config.clone(),
        instruments_loaded: summary.instruments_loaded,
        causality_rows: summary.granger.as_ref().map(|g| g.results.len()),
        working_set: summary
            .comparison
            .as_ref()
            .map(|c| c.working_set.tickers.clone())
            .unwrap_or_default(),
        working_set_fallback: summary
            .comparison
            .as_ref()
            .map_or(false, |c| c.working_set.fallback),
        recorded: summary.comparison.as_ref().map_or(0, |c| c.results.len()),
        skipped,
    };
    write_manifest(&config.manifest_path(), &manifest)?;
    Ok(())
}

fn run_stages(
    config: &AnalysisConfig,
    granger: bool,
    comparison: bool,
) -> Result<RunSummary, RunError> {
    config.validate()?;
    let table = load_input(config)?;
    let pool = build_pool(config.econometrics.workers)?;

    let granger = if granger {
        Some(granger_stage(config, &table, &pool)?)
    } else {
        None
    };
    let comparison = if comparison {
        Some(comparison_stage(config, &table, &pool)?)
    } else {
        None
    };

    let summary = RunSummary {
        dataset_hash: table.dataset_hash.clone(),
        instruments_loaded: table.instruments.len(),
        granger,
        comparison,
    };
    finish(config, &summary)?;
    Ok(summary)
}

/// Granger stage only: writes the causality table.
pub fn run_granger(config: &AnalysisConfig) -> Result<RunSummary, RunError> {
    run_stages(config, true, false)
}

/// Comparison stage only: reads the causality table if present, writes the comparison table.
pub fn run_comparison(config: &AnalysisConfig) -> Result<RunSummary, RunError> {
    run_stages(config, false, true)
}

/// Both stages in sequence.
pub fn run_pipeline(config: &AnalysisConfig) -> Result<RunSummary, RunError> {
    run_stages(config, true, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ticker: &str, lag: usize, p: f64, significant: bool) -> CausalityResult {
        CausalityResult {
            ticker: ticker.into(),
            lag_days: lag,
            f_statistic: 1.0,
            p_value: p,
            significant,
            interpretation: String::new(),
        }
    }

    fn all_lags() -> BTreeSet<SentimentLag> {
        SentimentLag::all().collect()
    }

    #[test]
    fn working_set_keeps_significant_loaded_tickers() {
        let causality = vec![
            row("PKN", 1, 0.01, true),
            row("PKN", 2, 0.5, false),
            row("CDR", 1, 0.4, false),
            row("GONE", 1, 0.001, true),
        ];
        let loaded = vec!["CDR".to_string(), "PKN".to_string()];
        let ws = working_set(&causality, &loaded);
        assert_eq!(ws.tickers, vec!["PKN".to_string()]);
        assert!(!ws.fallback);
    }

    #[test]
    fn working_set_falls_back_to_all_tickers() {
        let loaded = vec!["PKN".to_string(), "CDR".to_string()];
        let ws = working_set(&[row("PKN", 1, 0.4, false)], &loaded);
        assert!(ws.fallback);
        assert_eq!(ws.tickers, vec!["CDR".to_string(), "PKN".to_string()]);
        assert!(working_set(&[], &loaded).fallback);
    }

    #[test]
    fn best_lag_takes_minimum_p_among_significant_rows() {
        let causality = vec![
            row("PKN", 1, 0.04, true),
            row("PKN", 2, 0.001, false),
            row("PKN", 3, 0.02, true),
            row("PKN", 4, 0.02, true),
        ];
        assert_eq!(best_lag(&causality, "PKN"), 3);
        assert_eq!(best_lag(&causality, "CDR"), 1);
    }

    #[test]
    fn lag_resolution_falls_back_above_cap_and_fails_on_missing_column() {
        assert_eq!(resolve_lag("PKN", 4, &all_lags()).unwrap().get(), 4);
        assert_eq!(resolve_lag("PKN", 9, &all_lags()).unwrap(), SentimentLag::ONE);

        let only_first: BTreeSet<SentimentLag> = [SentimentLag::ONE].into_iter().collect();
        assert_eq!(
            resolve_lag("PKN", 3, &only_first).unwrap_err(),
            SkipReason::MissingLagColumn {
                column: "sentiment_lag3".into()
            }
        );
    }

    #[test]
    fn skip_stage_names() {
        assert_eq!(SkipStage::from(ModelStage::BaselineFit).to_string(), "baseline_fit");
        assert_eq!(SkipStage::LagResolution.to_string(), "lag_resolution");
    }
}

//! Granger causality sweep: does lagged sentiment help predict returns?
//!
//! H0: sentiment does not improve the forecast of returns beyond their own past.
//! For every lag `L` in `1..=max_lag` the restricted regression
//! `y_t ~ 1 + y_{t-1..t-L}` is nested in the unrestricted one that adds
//! `x_{t-1..t-L}`, and the drop in residual sum of squares is scored with an
//! F-test. All lags are evaluated; the best one is chosen later, globally.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::series::AlignedPairs;
use crate::stationarity;
use crate::stats::{f_sf, ols, OlsError};

/// Label written for significant rows.
pub const SIGNIFICANT_LABEL: &str = "Sentiment -> Price";
/// Label written for non-significant rows.
pub const NOT_SIGNIFICANT_LABEL: &str = "No relationship";

/// Aligned observations consumed per unit of lag.
pub const OBSERVATIONS_PER_LAG: usize = 3;

/// Smallest sample that leaves the lag-`lag` unrestricted regression a
/// positive residual degree of freedom: `n - L > 2L + 1`.
pub fn required_observations(lag: usize) -> usize {
    OBSERVATIONS_PER_LAG * lag + 2
}

/// One (instrument, lag) test outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalityResult {
    pub ticker: String,
    pub lag_days: usize,
    pub f_statistic: f64,
    pub p_value: f64,
    pub significant: bool,
    pub interpretation: String,
}

impl CausalityResult {
    fn new(ticker: &str, lag: usize, test: FTest, alpha: f64) -> Self {
        let significant = test.p_value < alpha;
        Self {
            ticker: ticker.to_string(),
            lag_days: lag,
            f_statistic: test.f_statistic,
            p_value: test.p_value,
            significant,
            interpretation: if significant {
                SIGNIFICANT_LABEL
            } else {
                NOT_SIGNIFICANT_LABEL
            }
            .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CausalityError {
    #[error("max_lag must be at least 1")]
    InvalidMaxLag,
    #[error("insufficient data: {n} aligned observations < {required} required")]
    InsufficientData { n: usize, required: usize },
    #[error("regression at lag {lag} failed: {source}")]
    Degenerate {
        lag: usize,
        #[source]
        source: OlsError,
    },
    #[error("unrestricted regression at lag {lag} fits exactly; F statistic undefined")]
    ZeroResidualVariance { lag: usize },
}

/// Nested-regression F-test for a single lag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FTest {
    pub f_statistic: f64,
    pub p_value: f64,
    pub df_num: usize,
    pub df_denom: usize,
}

/// F-test of `exog` Granger-causing `target` at `lag`.
pub fn f_test(target: &[f64], exog: &[f64], lag: usize) -> Result<FTest, CausalityError> {
    let n = target.len().min(exog.len());
    if lag == 0 {
        return Err(CausalityError::InvalidMaxLag);
    }
    let required = required_observations(lag);
    if n < required {
        return Err(CausalityError::InsufficientData { n, required });
    }
    let nobs = n - lag;

    let y = DVector::from_fn(nobs, |row, _| target[lag + row]);
    let restricted = DMatrix::from_fn(nobs, lag + 1, |row, col| {
        let t = lag + row;
        if col == 0 {
            1.0
        } else {
            target[t - col]
        }
    });
    let unrestricted = DMatrix::from_fn(nobs, 2 * lag + 1, |row, col| {
        let t = lag + row;
        match col {
            0 => 1.0,
            c if c <= lag => target[t - c],
            c => exog[t - (c - lag)],
        }
    });

    let degenerate = |source| CausalityError::Degenerate { lag, source };
    let fit_r = ols(&restricted, &y).map_err(degenerate)?;
    let fit_u = ols(&unrestricted, &y).map_err(degenerate)?;

    let scale = y.iter().map(|v| v * v).sum::<f64>().max(f64::MIN_POSITIVE);
    if fit_u.ssr <= scale * 1e-20 {
        return Err(CausalityError::ZeroResidualVariance { lag });
    }

    let df_denom = fit_u.df_resid;
    let f_statistic =
        ((fit_r.ssr - fit_u.ssr).max(0.0) / lag as f64) / (fit_u.ssr / df_denom as f64);
    let p_value = f_sf(f_statistic, lag as f64, df_denom as f64);

    Ok(FTest {
        f_statistic,
        p_value,
        df_num: lag,
        df_denom,
    })
}

/// Sweep lags `1..=max_lag` for one instrument.
///
/// Requires `required_observations(max_lag)` aligned observations. Returns
/// exactly `max_lag` rows on success, in lag order.
pub fn test_instrument(
    ticker: &str,
    pairs: &AlignedPairs,
    max_lag: usize,
    alpha: f64,
) -> Result<Vec<CausalityResult>, CausalityError> {
    if max_lag == 0 {
        return Err(CausalityError::InvalidMaxLag);
    }
    let n = pairs.len();
    let required = required_observations(max_lag);
    if n < required {
        warn!(ticker, n, required, "too few observations for Granger test, skipping");
        return Err(CausalityError::InsufficientData { n, required });
    }

    info!(ticker, n, max_lag, "Granger causality sweep");
    stationarity::diagnose(&format!("{ticker} log_return"), &pairs.target);
    stationarity::diagnose(&format!("{ticker} sentiment"), &pairs.exog);

    (1..=max_lag)
        .map(|lag| {
            let test = f_test(&pairs.target, &pairs.exog, lag)?;
            let row = CausalityResult::new(ticker, lag, test, alpha);
            let marker = if row.p_value < 0.01 {
                "***"
            } else if row.significant {
                "*"
            } else {
                ""
            };
            info!(
                ticker,
                lag,
                f = row.f_statistic,
                p = row.p_value,
                "{marker}"
            );
            Ok(row)
        })
        .collect()
}

/// Causality rows across instruments plus the instruments that were skipped.
#[derive(Debug, Clone, Default)]
pub struct CausalityBatch {
    /// Sorted by (ticker, lag).
    pub results: Vec<CausalityResult>,
    /// Sorted by ticker.
    pub skipped: Vec<(String, CausalityError)>,
}

impl CausalityBatch {
    pub fn significant(&self) -> impl Iterator<Item = &CausalityResult> {
        self.results.iter().filter(|r| r.significant)
    }
}

/// Run `test_instrument` for every instrument in parallel on the current rayon pool.
pub fn test_all(
    instruments: &BTreeMap<String, AlignedPairs>,
    max_lag: usize,
    alpha: f64,
) -> CausalityBatch {
    let outcomes: Vec<(String, Result<Vec<CausalityResult>, CausalityError>)> = instruments
        .par_iter()
        .map(|(ticker, pairs)| (ticker.clone(), test_instrument(ticker, pairs, max_lag, alpha)))
        .collect();

    let mut batch = CausalityBatch::default();
    for (ticker, outcome) in outcomes {
        match outcome {
            Ok(rows) => batch.results.extend(rows),
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Granger test skipped");
                batch.skipped.push((ticker, e));
            }
        }
    }
    batch
        .results
        .sort_by(|a, b| a.ticker.cmp(&b.ticker).then(a.lag_days.cmp(&b.lag_days)));
    batch.skipped.sort_by(|a, b| a.0.cmp(&b.0));
    batch
}

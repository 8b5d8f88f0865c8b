//! Augmented Dickey-Fuller unit-root test (constant, no trend).
//!
//! The verdict is advisory: callers log it and carry on. Nothing downstream
//! differences or rejects a series based on it.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::series::drop_missing;
use crate::stats::{normal_cdf, ols, OlsError};

/// Significance threshold for calling a series stationary.
pub const STATIONARITY_ALPHA: f64 = 0.05;

/// Smallest sample the test will run on.
pub const MIN_ADF_OBSERVATIONS: usize = 8;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StationarityError {
    #[error("insufficient data for ADF test: {n} observations < {min}")]
    InsufficientData { n: usize, min: usize },
    #[error("ADF regression failed: {0}")]
    Singular(#[from] OlsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StationarityReport {
    pub is_stationary: bool,
    pub p_value: f64,
    /// ADF tau statistic.
    pub statistic: f64,
    /// Augmenting lags chosen by AIC.
    pub used_lag: usize,
    /// Observations in the final regression.
    pub nobs: usize,
}

/// Three-way verdict once test failures are folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stationarity {
    Stationary,
    NonStationary,
    Unknown,
}

/// Run the ADF test on `values` (NaNs are removed first).
pub fn check(values: &[f64]) -> Result<StationarityReport, StationarityError> {
    let x = drop_missing(values);
    let n = x.len();
    if n < MIN_ADF_OBSERVATIONS {
        return Err(StationarityError::InsufficientData {
            n,
            min: MIN_ADF_OBSERVATIONS,
        });
    }

    // Schwert's rule, capped so the widest regression keeps residual df
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    let max_lag = schwert.min(n / 2 - 2);

    let diff: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();

    // Every candidate uses the sample that the widest lag allows
    let mut best: Option<(usize, f64)> = None;
    for lag in 0..=max_lag {
        let fit = ols_adf(&x, &diff, lag, max_lag)?;
        let aic = fit.aic();
        if best.map_or(true, |(_, b)| aic < b) {
            best = Some((lag, aic));
        }
    }
    let used_lag = best.map_or(0, |(lag, _)| lag);

    let fit = ols_adf(&x, &diff, used_lag, used_lag)?;
    // Column 1 is the lagged level
    let statistic = fit.t_stat(1);
    let p_value = mackinnon_p(statistic);

    Ok(StationarityReport {
        is_stationary: p_value < STATIONARITY_ALPHA,
        p_value,
        statistic,
        used_lag,
        nobs: fit.nobs,
    })
}

/// Run the test and log the verdict; test failures become `Unknown`.
pub fn diagnose(name: &str, values: &[f64]) -> Stationarity {
    match check(values) {
        Ok(report) if report.is_stationary => {
            info!(series = name, p_value = report.p_value, "ADF: stationary");
            Stationarity::Stationary
        }
        Ok(report) => {
            info!(
                series = name,
                p_value = report.p_value,
                "ADF: non-stationary (consider differencing)"
            );
            Stationarity::NonStationary
        }
        Err(e) => {
            warn!(series = name, error = %e, "ADF test failed, stationarity unknown");
            Stationarity::Unknown
        }
    }
}

/// `dy_t ~ 1 + y_{t-1} + dy_{t-1} + ... + dy_{t-lag}` over the last
/// `diff.len() - trim` differences.
fn ols_adf(
    levels: &[f64],
    diff: &[f64],
    lag: usize,
    trim: usize,
) -> Result<crate::stats::OlsFit, OlsError> {
    let nobs = diff.len() - trim;
    let start = trim;
    let design = DMatrix::from_fn(nobs, lag + 2, |row, col| {
        let t = start + row;
        match col {
            0 => 1.0,
            // diff[t] = levels[t+1] - levels[t], so y_{t-1} for diff[t] is levels[t]
            1 => levels[t],
            k => diff[t - (k - 1)],
        }
    });
    let y = DVector::from_fn(nobs, |row, _| diff[start + row]);
    ols(&design, &y)
}

// MacKinnon (1994) response surface, constant-only regression, one series.
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

/// Approximate asymptotic p-value of an ADF tau statistic.
pub fn mackinnon_p(tau: f64) -> f64 {
    if tau.is_nan() {
        return f64::NAN;
    }
    if tau > TAU_MAX {
        return 1.0;
    }
    if tau < TAU_MIN {
        return 0.0;
    }
    let coefs: &[f64] = if tau <= TAU_STAR {
        &TAU_SMALL_P
    } else {
        &TAU_LARGE_P
    };
    let poly = coefs.iter().rev().fold(0.0, |acc, c| acc * tau + c);
    normal_cdf(poly)
}

//! Baseline ARMA vs sentiment-augmented ARMAX on a chronological hold-out.
//!
//! The augmented forecast is fed the realised exogenous values of the test
//! slice. That is a look-ahead: it measures how much a known sentiment path
//! explains, not how well sentiment could be forecast.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::arma::{fit, ArmaOrder, FitFailure, FitOptions};
use crate::stats::rmse;

/// Default share of observations used for training.
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.8;

/// Reporting threshold for calling the sentiment coefficient significant.
pub const COEFFICIENT_ALPHA: f64 = 0.05;

/// `floor(train_fraction * n)`.
pub fn split_index(n: usize, train_fraction: f64) -> usize {
    ((train_fraction * n as f64).floor() as usize).min(n)
}

/// Split into `(train, test)` at `split_index`, preserving order.
pub fn chronological_split(values: &[f64], train_fraction: f64) -> (&[f64], &[f64]) {
    values.split_at(split_index(values.len(), train_fraction))
}

/// Pipeline stage a comparison failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelStage {
    Split,
    BaselineFit,
    AugmentedFit,
}

impl std::fmt::Display for ModelStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelStage::Split => "split",
            ModelStage::BaselineFit => "baseline_fit",
            ModelStage::AugmentedFit => "augmented_fit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{stage}: {failure}")]
pub struct ComparisonFailure {
    pub stage: ModelStage,
    #[source]
    pub failure: FitFailure,
}

impl ComparisonFailure {
    fn at(stage: ModelStage) -> impl FnOnce(FitFailure) -> Self {
        move |failure| Self { stage, failure }
    }
}

/// Out-of-sample metrics of the baseline and augmented models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMetrics {
    pub order: ArmaOrder,
    pub baseline_aic: f64,
    pub augmented_aic: f64,
    pub baseline_rmse: f64,
    pub augmented_rmse: f64,
    /// `(baseline_rmse - augmented_rmse) / baseline_rmse * 100`.
    pub rmse_improvement_pct: f64,
    pub exogenous_coefficient: f64,
    pub exogenous_pvalue: f64,
    pub n_train: usize,
    pub n_test: usize,
}

impl ComparisonMetrics {
    pub fn exogenous_significant(&self) -> bool {
        self.exogenous_pvalue < COEFFICIENT_ALPHA
    }
}

/// Fit both models on the training slice and score their forecasts on the rest.
pub fn compare(
    target: &[f64],
    exog: &[f64],
    order: ArmaOrder,
    train_fraction: f64,
    opts: &FitOptions,
) -> Result<ComparisonMetrics, ComparisonFailure> {
    if target.len() != exog.len() {
        return Err(ComparisonFailure {
            stage: ModelStage::Split,
            failure: FitFailure::ExogLengthMismatch {
                target: target.len(),
                exog: exog.len(),
            },
        });
    }

    let (train_y, test_y) = chronological_split(target, train_fraction);
    let (train_x, test_x) = chronological_split(exog, train_fraction);
    if test_y.is_empty() {
        return Err(ComparisonFailure {
            stage: ModelStage::Split,
            failure: FitFailure::EmptyHoldout,
        });
    }
    let steps = test_y.len();

    let baseline =
        fit(train_y, None, order, opts).map_err(ComparisonFailure::at(ModelStage::BaselineFit))?;
    let baseline_pred = baseline
        .forecast(steps, None)
        .map_err(ComparisonFailure::at(ModelStage::BaselineFit))?;
    let baseline_rmse = rmse(test_y, &baseline_pred);
    debug!(%order, aic = baseline.aic, rmse = baseline_rmse, "baseline fitted");

    let augmented = fit(train_y, Some(train_x), order, opts)
        .map_err(ComparisonFailure::at(ModelStage::AugmentedFit))?;
    let augmented_pred = augmented
        .forecast(steps, Some(test_x))
        .map_err(ComparisonFailure::at(ModelStage::AugmentedFit))?;
    let augmented_rmse = rmse(test_y, &augmented_pred);
    debug!(%order, aic = augmented.aic, rmse = augmented_rmse, "augmented fitted");

    let coefficient = augmented.exog.ok_or(ComparisonFailure {
        stage: ModelStage::AugmentedFit,
        failure: FitFailure::SingularCovariance,
    })?;

    let improvement = (baseline_rmse - augmented_rmse) / baseline_rmse * 100.0;
    for (name, value) in [
        ("baseline RMSE", baseline_rmse),
        ("augmented RMSE", augmented_rmse),
        ("RMSE improvement", improvement),
    ] {
        if !value.is_finite() {
            return Err(ComparisonFailure {
                stage: ModelStage::AugmentedFit,
                failure: FitFailure::NonFiniteMetric(name),
            });
        }
    }

    Ok(ComparisonMetrics {
        order,
        baseline_aic: baseline.aic,
        augmented_aic: augmented.aic,
        baseline_rmse,
        augmented_rmse,
        rmse_improvement_pct: improvement,
        exogenous_coefficient: coefficient.value,
        exogenous_pvalue: coefficient.p_value,
        n_train: train_y.len(),
        n_test: steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
            })
            .collect()
    }

    #[test]
    fn split_is_floor_of_fraction() {
        assert_eq!(split_index(10, 0.8), 8);
        assert_eq!(split_index(39, 0.8), 31);
        assert_eq!(split_index(0, 0.8), 0);
        let values: Vec<f64> = (0..7).map(f64::from).collect();
        let (train, test) = chronological_split(&values, 0.8);
        assert_eq!(train, &[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(test, &[5.0, 6.0]);
    }

    #[test]
    fn informative_exog_improves_rmse() {
        let n = 200;
        let x = noise(n, 1);
        let e = noise(n, 2);
        let y: Vec<f64> = (0..n).map(|t| 0.03 * x[t] + 0.005 * e[t]).collect();

        let m = compare(&y, &x, ArmaOrder::new(1, 0), 0.8, &FitOptions::default()).unwrap();
        assert_eq!(m.n_train, 160);
        assert_eq!(m.n_test, 40);
        assert!(m.augmented_rmse < m.baseline_rmse);
        assert!(m.rmse_improvement_pct > 50.0, "{}", m.rmse_improvement_pct);
        assert!(m.exogenous_significant());
        assert!(m.augmented_aic < m.baseline_aic);
    }

    #[test]
    fn constant_target_fails_in_baseline_stage() {
        let opts = FitOptions::default();
        let err = compare(&[0.0; 50], &noise(50, 3), ArmaOrder::FALLBACK, 0.8, &opts).unwrap_err();
        assert_eq!(err.stage, ModelStage::BaselineFit);
        assert_eq!(err.failure, FitFailure::ZeroVariance);
    }

    #[test]
    fn length_mismatch_fails_before_fitting() {
        let err = compare(&[0.1; 10], &[0.1; 9], ArmaOrder::FALLBACK, 0.8, &FitOptions::default())
            .unwrap_err();
        assert_eq!(err.stage, ModelStage::Split);
    }

    #[test]
    fn empty_holdout_is_a_split_failure() {
        let opts = FitOptions::default();
        let err =
            compare(&noise(20, 4), &noise(20, 5), ArmaOrder::FALLBACK, 1.0, &opts).unwrap_err();
        assert_eq!(err.failure, FitFailure::EmptyHoldout);
    }
}

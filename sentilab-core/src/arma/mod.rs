//! ARMA and ARMAX (regression with ARMA errors) by exact maximum likelihood.
//!
//! Model: `y_t = c + beta x_t + u_t`, where `u_t` is a zero-mean ARMA(p, q)
//! process. The integration order is always 0 because inputs are returns.
//!
//! Estimation standardises `y` (and `x`), maximises the Kalman-filter
//! likelihood with Nelder-Mead under stationarity/invertibility constraints,
//! then maps everything back to the original units. Standard errors for the
//! regression coefficients come from the inverse numerical Hessian.

pub mod state_space;
pub mod transform;

use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stats::{
    self, nelder_mead, numerical_hessian, ols, two_sided_normal_p, NelderMeadOptions,
};
use state_space::ArmaStateSpace;
use transform::{constrain_invertible, constrain_stationary};

/// ARIMA order with `d` fixed at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArmaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArmaOrder {
    pub const fn new(p: usize, q: usize) -> Self {
        Self { p, d: 0, q }
    }

    /// Order used when no candidate in a search converges.
    pub const FALLBACK: ArmaOrder = ArmaOrder::new(1, 0);
}

impl fmt::Display for ArmaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.p, self.d, self.q)
    }
}

/// Why a fit (or a forecast from it) failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitFailure {
    #[error("too few observations: {n} < {required}")]
    TooFewObservations { n: usize, required: usize },
    #[error("series has zero variance")]
    ZeroVariance,
    #[error("exogenous regressor has zero variance")]
    ConstantExogenous,
    #[error("non-finite values in input")]
    NonFinite,
    #[error("exogenous length {exog} does not match target length {target}")]
    ExogLengthMismatch { target: usize, exog: usize },
    #[error("likelihood could not be evaluated at the starting point")]
    LikelihoodFailed,
    #[error("optimizer did not converge within {iterations} iterations")]
    NotConverged { iterations: usize },
    #[error("parameter covariance is singular")]
    SingularCovariance,
    #[error("design matrix is singular: {0}")]
    SingularDesign(String),
    #[error("forecast produced non-finite values")]
    NonFiniteForecast,
    #[error("no held-out observations to forecast")]
    EmptyHoldout,
    #[error("{0} is not finite")]
    NonFiniteMetric(&'static str),
}

/// Limits for a single fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Nelder-Mead iteration budget; bounds the time any one series can take.
    pub max_iterations: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
        }
    }
}

/// A regression coefficient with its Wald inference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoefficientEstimate {
    pub value: f64,
    pub std_error: f64,
    /// Two-sided p-value under the normal approximation.
    pub p_value: f64,
}

/// A fitted ARMA/ARMAX model.
#[derive(Debug, Clone)]
pub struct ArmaFit {
    pub order: ArmaOrder,
    pub constant: f64,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    /// Present only for ARMAX fits.
    pub exog: Option<CoefficientEstimate>,
    pub sigma2: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub nobs: usize,
    pub iterations: usize,
    /// Predicted ARMA-error state after the last training observation (original units).
    next_state: Vec<f64>,
}

impl ArmaFit {
    /// Number of estimated parameters, including sigma^2.
    pub fn n_params(&self) -> usize {
        param_count(self.order, self.exog.is_some())
    }

    /// Forecast `steps` ahead. ARMAX fits need `future_exog` of length `steps`.
    pub fn forecast(
        &self,
        steps: usize,
        future_exog: Option<&[f64]>,
    ) -> Result<Vec<f64>, FitFailure> {
        let beta = match (self.exog, future_exog) {
            (Some(coef), Some(x)) if x.len() == steps => Some((coef.value, x)),
            (Some(_), Some(x)) => {
                return Err(FitFailure::ExogLengthMismatch {
                    target: steps,
                    exog: x.len(),
                })
            }
            (Some(_), None) => {
                return Err(FitFailure::ExogLengthMismatch {
                    target: steps,
                    exog: 0,
                })
            }
            (None, _) => None,
        };

        let ss = ArmaStateSpace::new(&self.ar, &self.ma);
        let errors = ss.forecast(&self.next_state, steps);
        let out: Vec<f64> = errors
            .iter()
            .enumerate()
            .map(|(h, u)| {
                let regression = beta.map_or(0.0, |(b, x)| b * x[h]);
                self.constant + regression + u
            })
            .collect();

        if out.iter().any(|v| !v.is_finite()) {
            return Err(FitFailure::NonFiniteForecast);
        }
        Ok(out)
    }
}

fn param_count(order: ArmaOrder, has_exog: bool) -> usize {
    1 + usize::from(has_exog) + order.p + order.q + 1
}

/// Unpacked view of an unconstrained parameter vector
/// laid out as `[c, (beta), z_ar.., z_ma..]`.
struct Unpacked {
    constant: f64,
    beta: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
}

fn unpack(theta: &[f64], order: ArmaOrder, has_exog: bool) -> Unpacked {
    let k = 1 + usize::from(has_exog);
    Unpacked {
        constant: theta[0],
        beta: if has_exog { theta[1] } else { 0.0 },
        ar: constrain_stationary(&theta[k..k + order.p]),
        ma: constrain_invertible(&theta[k + order.p..k + order.p + order.q]),
    }
}

/// Negative concentrated log-likelihood on standardised data.
fn negative_log_likelihood(
    theta: &[f64],
    y: &[f64],
    x: Option<&[f64]>,
    order: ArmaOrder,
) -> f64 {
    let params = unpack(theta, order, x.is_some());
    let u: Vec<f64> = match x {
        Some(x) => y
            .iter()
            .zip(x)
            .map(|(yt, xt)| yt - params.constant - params.beta * xt)
            .collect(),
        None => y.iter().map(|yt| yt - params.constant).collect(),
    };
    ArmaStateSpace::new(&params.ar, &params.ma)
        .filter(&u)
        .map_or(f64::INFINITY, |out| -out.log_likelihood)
}

/// Fit ARMA(p, 0, q) with a constant, optionally with one exogenous column.
pub fn fit(
    y: &[f64],
    exog: Option<&[f64]>,
    order: ArmaOrder,
    opts: &FitOptions,
) -> Result<ArmaFit, FitFailure> {
    let n = y.len();
    if let Some(x) = exog {
        if x.len() != n {
            return Err(FitFailure::ExogLengthMismatch {
                target: n,
                exog: x.len(),
            });
        }
    }
    let has_exog = exog.is_some();
    let k = param_count(order, has_exog);
    let required = k + order.p.max(order.q + 1) + 1;
    if n < required {
        return Err(FitFailure::TooFewObservations { n, required });
    }
    if y.iter().chain(exog.unwrap_or(&[])).any(|v| !v.is_finite()) {
        return Err(FitFailure::NonFinite);
    }

    let y_scale = stats::variance(y).sqrt();
    if !(y_scale > 1e-12) {
        return Err(FitFailure::ZeroVariance);
    }
    let x_scale = match exog {
        Some(x) => {
            let s = stats::variance(x).sqrt();
            if !(s > 1e-12) {
                return Err(FitFailure::ConstantExogenous);
            }
            s
        }
        None => 1.0,
    };
    let ys: Vec<f64> = y.iter().map(|v| v / y_scale).collect();
    let xs: Option<Vec<f64>> = exog.map(|x| x.iter().map(|v| v / x_scale).collect());
    let xs_ref = xs.as_deref();

    let start = initial_params(&ys, xs_ref, order)?;
    let objective = |theta: &[f64]| negative_log_likelihood(theta, &ys, xs_ref, order);
    if !objective(&start).is_finite() {
        return Err(FitFailure::LikelihoodFailed);
    }

    let nm = NelderMeadOptions {
        max_iterations: opts.max_iterations,
        x_tol: 1e-5,
        f_tol: 1e-7,
        initial_step: 0.1,
    };
    let first = nelder_mead(objective, &start, &nm);
    if !first.converged {
        return Err(FitFailure::NotConverged {
            iterations: first.iterations,
        });
    }
    // Restart from the optimum with a smaller simplex
    let remaining = NelderMeadOptions {
        max_iterations: opts.max_iterations.saturating_sub(first.iterations),
        initial_step: 0.05,
        ..nm
    };
    let second = nelder_mead(objective, &first.x, &remaining);
    let iterations = first.iterations + second.iterations;
    let best = if second.converged && second.value <= first.value {
        second
    } else {
        first
    };
    if !best.value.is_finite() {
        return Err(FitFailure::LikelihoodFailed);
    }

    let params = unpack(&best.x, order, has_exog);

    let exog_estimate = if has_exog {
        let hessian = numerical_hessian(objective, &best.x).ok_or(FitFailure::SingularCovariance)?;
        let dim = best.x.len();
        let h = DMatrix::from_fn(dim, dim, |i, j| hessian[i][j]);
        let cov = h.try_inverse().ok_or(FitFailure::SingularCovariance)?;
        let var_scaled = cov[(1, 1)];
        if !(var_scaled > 0.0) || !var_scaled.is_finite() {
            return Err(FitFailure::SingularCovariance);
        }
        let se_scaled = var_scaled.sqrt();
        let to_original = y_scale / x_scale;
        Some(CoefficientEstimate {
            value: params.beta * to_original,
            std_error: se_scaled * to_original,
            p_value: two_sided_normal_p(params.beta / se_scaled),
        })
    } else {
        None
    };

    // Recover the terminal filter state at the optimum
    let residuals: Vec<f64> = match xs_ref {
        Some(x) => ys
            .iter()
            .zip(x)
            .map(|(yt, xt)| yt - params.constant - params.beta * xt)
            .collect(),
        None => ys.iter().map(|yt| yt - params.constant).collect(),
    };
    let filtered = ArmaStateSpace::new(&params.ar, &params.ma)
        .filter(&residuals)
        .ok_or(FitFailure::LikelihoodFailed)?;

    let log_likelihood = filtered.log_likelihood - n as f64 * y_scale.ln();
    let aic = -2.0 * log_likelihood + 2.0 * k as f64;

    Ok(ArmaFit {
        order,
        constant: params.constant * y_scale,
        ar: params.ar,
        ma: params.ma,
        exog: exog_estimate,
        sigma2: filtered.sigma2 * y_scale * y_scale,
        log_likelihood,
        aic,
        nobs: n,
        iterations,
        next_state: filtered.next_state.iter().map(|v| v * y_scale).collect(),
    })
}

/// Mean (and regression) terms from OLS; ARMA terms start at zero.
fn initial_params(y: &[f64], x: Option<&[f64]>, order: ArmaOrder) -> Result<Vec<f64>, FitFailure> {
    let n = y.len();
    let cols = 1 + usize::from(x.is_some());
    let design = DMatrix::from_fn(n, cols, |i, j| match (j, x) {
        (0, _) => 1.0,
        (_, Some(x)) => x[i],
        (_, None) => 0.0,
    });
    let target = DVector::from_column_slice(y);
    let reg = ols(&design, &target).map_err(|e| FitFailure::SingularDesign(e.to_string()))?;

    let mut start = reg.params;
    start.extend(std::iter::repeat(0.0).take(order.p + order.q));
    Ok(start)
}

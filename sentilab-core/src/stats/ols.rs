//! Ordinary least squares on a dense design matrix.
//!
//! Solved through the SVD so that rank deficiency is detected explicitly
//! instead of surfacing as garbage coefficients.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Errors from an OLS fit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OlsError {
    #[error("underdetermined regression: {nobs} observations for {k} regressors")]
    Underdetermined { nobs: usize, k: usize },
    #[error("rank-deficient design matrix: rank {rank} < {k} regressors")]
    RankDeficient { rank: usize, k: usize },
    #[error("non-finite values in regression input")]
    NonFinite,
    #[error("least-squares solve failed: {0}")]
    Solve(&'static str),
}

/// Result of an OLS regression.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub params: Vec<f64>,
    pub std_errors: Vec<f64>,
    /// Sum of squared residuals.
    pub ssr: f64,
    pub nobs: usize,
    pub df_resid: usize,
}

impl OlsFit {
    /// Number of estimated coefficients.
    pub fn k(&self) -> usize {
        self.params.len()
    }

    /// Gaussian log-likelihood with sigma^2 concentrated out.
    pub fn log_likelihood(&self) -> f64 {
        let n = self.nobs as f64;
        -0.5 * n * ((2.0 * std::f64::consts::PI).ln() + (self.ssr / n).ln() + 1.0)
    }

    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood() + 2.0 * self.k() as f64
    }

    /// t statistic of coefficient `i` (NaN when its standard error is zero).
    pub fn t_stat(&self, i: usize) -> f64 {
        let se = self.std_errors[i];
        if se > 0.0 {
            self.params[i] / se
        } else {
            f64::NAN
        }
    }
}

/// Fit `y = X b + e` by least squares.
pub fn ols(design: &DMatrix<f64>, y: &DVector<f64>) -> Result<OlsFit, OlsError> {
    let nobs = design.nrows();
    let k = design.ncols();
    if nobs <= k {
        return Err(OlsError::Underdetermined { nobs, k });
    }
    if design.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(OlsError::NonFinite);
    }

    let svd = design.clone().svd(true, true);
    let max_sv = svd.singular_values.max();
    let tol = max_sv * nobs.max(k) as f64 * f64::EPSILON;
    let rank = svd.rank(tol);
    if rank < k {
        return Err(OlsError::RankDeficient { rank, k });
    }

    let beta = svd.solve(y, tol).map_err(OlsError::Solve)?;
    let residuals = y - design * &beta;
    let ssr = residuals.norm_squared();
    let df_resid = nobs - k;
    let sigma2 = ssr / df_resid as f64;

    // (X'X)^-1 = V diag(1/s^2) V'
    let v_t = svd.v_t.as_ref().ok_or(OlsError::Solve("missing V^T"))?;
    let std_errors = (0..k)
        .map(|j| {
            let var: f64 = (0..k)
                .map(|i| v_t[(i, j)].powi(2) / svd.singular_values[i].powi(2))
                .sum();
            (sigma2 * var).sqrt()
        })
        .collect();

    Ok(OlsFit {
        params: beta.iter().copied().collect(),
        std_errors,
        ssr,
        nobs,
        df_resid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_line_is_recovered() {
        // y = 2 + 3x with tiny deterministic noise
        let n = 20;
        let x = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { i as f64 });
        let y = DVector::from_fn(n, |i, _| {
            2.0 + 3.0 * i as f64 + if i % 2 == 0 { 0.01 } else { -0.01 }
        });

        let fit = ols(&x, &y).unwrap();
        assert!((fit.params[0] - 2.0).abs() < 0.02);
        assert!((fit.params[1] - 3.0).abs() < 1e-3);
        assert_eq!(fit.df_resid, 18);
        assert!(fit.ssr < 0.01);
        assert!(fit.std_errors.iter().all(|se| se.is_finite() && *se > 0.0));
    }

    #[test]
    fn collinear_columns_are_rejected() {
        let n = 10;
        let x = DMatrix::from_fn(n, 3, |i, j| match j {
            0 => 1.0,
            1 => i as f64,
            _ => 2.0 * i as f64,
        });
        let y = DVector::from_fn(n, |i, _| i as f64);

        assert!(matches!(
            ols(&x, &y),
            Err(OlsError::RankDeficient { rank: 2, k: 3 })
        ));
    }

    #[test]
    fn too_few_rows_is_underdetermined() {
        let x = DMatrix::from_element(2, 2, 1.0);
        let y = DVector::from_element(2, 1.0);
        assert!(matches!(
            ols(&x, &y),
            Err(OlsError::Underdetermined { nobs: 2, k: 2 })
        ));
    }

    #[test]
    fn nan_input_is_rejected() {
        let x = DMatrix::from_fn(5, 1, |_, _| 1.0);
        let mut y = DVector::from_element(5, 1.0);
        y[3] = f64::NAN;
        assert_eq!(ols(&x, &y).unwrap_err(), OlsError::NonFinite);
    }
}

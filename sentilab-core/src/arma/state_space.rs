//! Kalman filter for a zero-mean ARMA(p, q) process in Harvey's state-space form.
//!
//! State dimension `r = max(p, q + 1)`:
//!
//! ```text
//! u_t       = Z a_t,              Z = [1, 0, ..., 0]
//! a_{t+1}   = T a_t + R e_{t+1},  T[i][0] = phi_{i+1}, T[i][i+1] = 1
//!                                 R = [1, theta_1, ..., theta_{r-1}]
//! ```
//!
//! The filter runs with unit innovation variance so sigma^2 can be
//! concentrated out of the likelihood.

use nalgebra::{DMatrix, DVector};

/// Matrices of one ARMA parameterisation.
#[derive(Debug, Clone)]
pub struct ArmaStateSpace {
    dim: usize,
    /// First column of T, padded with zeros to `dim`.
    phi: Vec<f64>,
    /// R, padded with zeros to `dim`.
    r: Vec<f64>,
}

/// Output of a filter pass over a sample.
#[derive(Debug, Clone)]
pub struct FilterOutput {
    /// Concentrated Gaussian log-likelihood.
    pub log_likelihood: f64,
    /// Maximum-likelihood innovation variance.
    pub sigma2: f64,
    /// One-step-ahead predicted state after the last observation.
    pub next_state: Vec<f64>,
}

impl ArmaStateSpace {
    pub fn new(ar: &[f64], ma: &[f64]) -> Self {
        let dim = ar.len().max(ma.len() + 1);
        let mut phi = vec![0.0; dim];
        phi[..ar.len()].copy_from_slice(ar);
        let mut r = vec![0.0; dim];
        r[0] = 1.0;
        r[1..=ma.len()].copy_from_slice(ma);
        Self { dim, phi, r }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// (T a)_i = phi_i a_0 + a_{i+1}
    fn transition(&self, a: &[f64], out: &mut [f64]) {
        let m = self.dim;
        for i in 0..m {
            let shifted = if i + 1 < m { a[i + 1] } else { 0.0 };
            out[i] = self.phi[i] * a[0] + shifted;
        }
    }

    /// T P T' into `out`, using `scratch` for T P.
    fn propagate(&self, p: &[f64], scratch: &mut [f64], out: &mut [f64]) {
        let m = self.dim;
        for i in 0..m {
            for j in 0..m {
                let shifted = if i + 1 < m { p[(i + 1) * m + j] } else { 0.0 };
                scratch[i * m + j] = self.phi[i] * p[j] + shifted;
            }
        }
        for i in 0..m {
            for j in 0..m {
                let shifted = if j + 1 < m { scratch[i * m + j + 1] } else { 0.0 };
                out[i * m + j] = scratch[i * m] * self.phi[j] + shifted;
            }
        }
    }

    /// Unconditional state covariance: solves P = T P T' + R R'.
    ///
    /// Returns a row-major `dim x dim` buffer, or `None` if the system is
    /// singular (non-stationary parameters).
    pub fn stationary_covariance(&self) -> Option<Vec<f64>> {
        let m = self.dim;
        let t = DMatrix::from_fn(m, m, |i, j| {
            if j == 0 {
                self.phi[i]
            } else if j == i + 1 {
                1.0
            } else {
                0.0
            }
        });
        let rr = DMatrix::from_fn(m, m, |i, j| self.r[i] * self.r[j]);
        let lhs = DMatrix::<f64>::identity(m * m, m * m) - t.kronecker(&t);
        let rhs = DVector::from_column_slice(rr.as_slice());
        let sol = lhs.lu().solve(&rhs)?;
        if sol.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let p = DMatrix::from_column_slice(m, m, sol.as_slice());
        if p[(0, 0)] <= 0.0 {
            return None;
        }
        Some((0..m * m).map(|k| 0.5 * (p[(k / m, k % m)] + p[(k % m, k / m)])).collect())
    }

    /// Run the filter over `u` (already demeaned / regression residuals).
    pub fn filter(&self, u: &[f64]) -> Option<FilterOutput> {
        let m = self.dim;
        let n = u.len();
        if n == 0 {
            return None;
        }

        let rr: Vec<f64> = (0..m * m)
            .map(|k| self.r[k / m] * self.r[k % m])
            .collect();
        let mut p = self.stationary_covariance()?;
        let mut a = vec![0.0; m];
        let mut a_next = vec![0.0; m];
        let mut k_gain = vec![0.0; m];
        let mut tp = vec![0.0; m];
        let mut scratch = vec![0.0; m * m];
        let mut p_next = vec![0.0; m * m];

        let mut sum_log_f = 0.0;
        let mut sum_scaled_v2 = 0.0;

        for &obs in u {
            let v = obs - a[0];
            let f = p[0];
            if !(f > 1e-12) || !f.is_finite() {
                return None;
            }
            sum_log_f += f.ln();
            sum_scaled_v2 += v * v / f;

            // K = T P Z' / F, where P Z' is the first column of P
            let first_col: Vec<f64> = (0..m).map(|i| p[i * m]).collect();
            self.transition(&first_col, &mut tp);
            for i in 0..m {
                k_gain[i] = tp[i] / f;
            }

            self.transition(&a, &mut a_next);
            for i in 0..m {
                a[i] = a_next[i] + k_gain[i] * v;
            }

            self.propagate(&p, &mut scratch, &mut p_next);
            for i in 0..m {
                for j in 0..m {
                    p[i * m + j] = p_next[i * m + j] + rr[i * m + j] - k_gain[i] * k_gain[j] * f;
                }
            }
            for i in 0..m {
                for j in (i + 1)..m {
                    let s = 0.5 * (p[i * m + j] + p[j * m + i]);
                    p[i * m + j] = s;
                    p[j * m + i] = s;
                }
            }
        }

        let nf = n as f64;
        let sigma2 = sum_scaled_v2 / nf;
        if !(sigma2 > 0.0) || !sigma2.is_finite() {
            return None;
        }
        let log_likelihood = -0.5 * nf * ((2.0 * std::f64::consts::PI).ln() + sigma2.ln() + 1.0)
            - 0.5 * sum_log_f;

        Some(FilterOutput {
            log_likelihood,
            sigma2,
            next_state: a,
        })
    }

    /// Point forecasts `u_{n+1..n+steps}` from the one-step-ahead state.
    pub fn forecast(&self, next_state: &[f64], steps: usize) -> Vec<f64> {
        let m = self.dim;
        let mut a = next_state.to_vec();
        let mut buf = vec![0.0; m];
        let mut out = Vec::with_capacity(steps);
        for _ in 0..steps {
            out.push(a[0]);
            self.transition(&a, &mut buf);
            std::mem::swap(&mut a, &mut buf);
        }
        out
    }
}

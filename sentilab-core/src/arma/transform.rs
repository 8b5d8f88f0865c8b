//! Reparameterisations that keep the optimiser inside the stationary and
//! invertible region.
//!
//! Each unconstrained real is squashed into (-1, 1) and read as a partial
//! autocorrelation. The Durbin-Levinson recursion then turns the partial
//! autocorrelations into polynomial coefficients, and any such sequence yields
//! a stationary AR polynomial.

/// Unconstrained reals -> stationary AR coefficients `phi` in
/// `y_t = phi_1 y_{t-1} + ... + phi_p y_{t-p} + e_t`.
pub fn constrain_stationary(unconstrained: &[f64]) -> Vec<f64> {
    let pacf: Vec<f64> = unconstrained
        .iter()
        .map(|z| z / (1.0 + z * z).sqrt())
        .collect();

    let mut phi: Vec<f64> = Vec::with_capacity(pacf.len());
    for (k, &r) in pacf.iter().enumerate() {
        let mut next = vec![0.0; k + 1];
        for i in 0..k {
            next[i] = phi[i] - r * phi[k - 1 - i];
        }
        next[k] = r;
        phi = next;
    }
    phi
}

/// Unconstrained reals -> invertible MA coefficients `theta` in
/// `e_t + theta_1 e_{t-1} + ... + theta_q e_{t-q}`.
pub fn constrain_invertible(unconstrained: &[f64]) -> Vec<f64> {
    constrain_stationary(unconstrained)
        .into_iter()
        .map(|c| -c)
        .collect()
}

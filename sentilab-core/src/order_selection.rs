//! Grid search over ARMA(p, 0, q) orders by AIC.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::arma::{fit, ArmaOrder, FitOptions};
use crate::series::drop_missing;

/// Winner of an order search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderSelectionResult {
    pub order: ArmaOrder,
    /// `+inf` when no candidate converged.
    pub aic: f64,
    /// Candidates that converged.
    pub converged: usize,
    /// Candidates tried.
    pub candidates: usize,
}

impl OrderSelectionResult {
    /// True when the search fell back to `ArmaOrder::FALLBACK` because nothing converged.
    pub fn degraded(&self) -> bool {
        self.aic.is_infinite()
    }
}

/// Candidate orders in iteration order: p-major, then q, skipping (0, 0).
pub fn candidate_orders(max_p: usize, max_q: usize) -> Vec<ArmaOrder> {
    (0..=max_p)
        .flat_map(|p| (0..=max_q).map(move |q| ArmaOrder::new(p, q)))
        .filter(|o| o.p != 0 || o.q != 0)
        .collect()
}

/// Pick the ARMA order with the lowest AIC.
///
/// Ties keep the earliest candidate. Missing values are dropped first.
pub fn select_order(
    series: &[f64],
    max_p: usize,
    max_q: usize,
    opts: &FitOptions,
) -> OrderSelectionResult {
    let y = drop_missing(series);
    let candidates = candidate_orders(max_p, max_q);

    let mut best_order = ArmaOrder::FALLBACK;
    let mut best_aic = f64::INFINITY;
    let mut converged = 0;

    for order in &candidates {
        match fit(&y, None, *order, opts) {
            Ok(model) => {
                converged += 1;
                debug!(%order, aic = model.aic, "candidate fitted");
                if model.aic < best_aic {
                    best_aic = model.aic;
                    best_order = *order;
                }
            }
            Err(e) => debug!(%order, error = %e, "candidate failed"),
        }
    }

    OrderSelectionResult {
        order: best_order,
        aic: best_aic,
        converged,
        candidates: candidates.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_skips_white_noise_order() {
        let grid = candidate_orders(1, 1);
        assert_eq!(
            grid,
            vec![ArmaOrder::new(0, 1), ArmaOrder::new(1, 0), ArmaOrder::new(1, 1)]
        );
        assert_eq!(candidate_orders(3, 3).len(), 15);
        assert!(candidate_orders(0, 0).is_empty());
    }

    #[test]
    fn nothing_converges_on_constant_series() {
        let result = select_order(&[0.0; 40], 2, 2, &FitOptions::default());
        assert!(result.degraded());
        assert_eq!(result.order, ArmaOrder::FALLBACK);
        assert_eq!(result.converged, 0);
        assert_eq!(result.candidates, 8);
    }

    #[test]
    fn empty_grid_degrades_to_fallback() {
        let result = select_order(&[0.1, 0.2, 0.3], 0, 0, &FitOptions::default());
        assert!(result.degraded());
        assert_eq!(result.candidates, 0);
    }
}

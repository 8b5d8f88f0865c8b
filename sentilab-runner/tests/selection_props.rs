//! Property tests for working-set and best-lag selection.

use proptest::prelude::*;
use sentilab_core::granger::CausalityResult;
use sentilab_runner::orchestrator::{best_lag, working_set};

const TICKERS: [&str; 4] = ["ALR", "CDR", "KGH", "PKN"];

fn arb_rows() -> impl Strategy<Value = Vec<CausalityResult>> {
    prop::collection::vec((0usize..4, 1usize..=8, 0.0..1.0_f64), 0..40).prop_map(|rows| {
        rows.into_iter()
            .map(|(t, lag, p)| CausalityResult {
                ticker: TICKERS[t].to_string(),
                lag_days: lag,
                f_statistic: 1.0,
                p_value: p,
                significant: p < 0.05,
                interpretation: String::new(),
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn best_lag_has_minimal_significant_p(rows in arb_rows()) {
        for ticker in TICKERS {
            let lag = best_lag(&rows, ticker);
            let significant: Vec<&CausalityResult> =
                rows.iter().filter(|r| r.ticker == ticker && r.significant).collect();
            match significant.iter().map(|r| r.p_value).reduce(f64::min) {
                None => prop_assert_eq!(lag, 1),
                Some(min_p) => {
                    let first = significant.iter().find(|r| r.p_value == min_p).unwrap();
                    prop_assert_eq!(lag, first.lag_days);
                }
            }
        }
    }

    #[test]
    fn working_set_is_sorted_and_never_empty(rows in arb_rows()) {
        let loaded: Vec<String> = TICKERS.iter().rev().map(|t| t.to_string()).collect();
        let ws = working_set(&rows, &loaded);
        prop_assert!(!ws.tickers.is_empty());
        prop_assert!(ws.tickers.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(ws.fallback, !rows.iter().any(|r| r.significant));
        for ticker in &ws.tickers {
            prop_assert!(ws.fallback || rows.iter().any(|r| &r.ticker == ticker && r.significant));
        }
    }
}

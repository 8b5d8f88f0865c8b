//! Granger sweep behaviour on synthetic lead/lag data.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sentilab_core::granger::{test_all, test_instrument, NOT_SIGNIFICANT_LABEL, SIGNIFICANT_LABEL};
use sentilab_core::series::AlignedPairs;

fn gaussian(rng: &mut StdRng, n: usize) -> Vec<f64> {
    (0..n)
        .map(|_| {
            // Box-Muller
            let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
            let u2: f64 = rng.gen();
            (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
        })
        .collect()
}

/// Returns lead sentiment by two days: `y_t = 0.8 x_{t-2} + 0.4 e_t`.
fn two_day_lead(n: usize, seed: u64) -> AlignedPairs {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = gaussian(&mut rng, n);
    let e = gaussian(&mut rng, n);
    let y = (0..n)
        .map(|t| if t >= 2 { 0.8 * x[t - 2] + 0.4 * e[t] } else { 0.4 * e[t] })
        .collect();
    AlignedPairs::from_vectors(y, x)
}

#[test]
fn two_day_lead_is_found_at_lag_two() {
    let pairs = two_day_lead(40, 11);
    // Capped at lag 3: lags 4 and 5 nest x_{t-2} too and stay significant
    // on a 40-row sample.
    let rows = test_instrument("ABC", &pairs, 3, 0.05).unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows.iter().map(|r| r.lag_days).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    let lag2 = &rows[1];
    assert!(lag2.significant, "p = {}", lag2.p_value);
    assert_eq!(lag2.interpretation, SIGNIFICANT_LABEL);
    // Lag 3 nests the lag-2 regressor, so it must also see the lead
    assert!(rows[2].significant);
    assert!(rows.iter().all(|r| r.ticker == "ABC"));
}

#[test]
fn every_lag_is_reported_even_when_nothing_is_significant() {
    let mut rng = StdRng::seed_from_u64(5);
    let pairs = AlignedPairs::from_vectors(gaussian(&mut rng, 80), gaussian(&mut rng, 80));
    let rows = test_instrument("NOISE", &pairs, 5, 1e-9).unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| !r.significant));
    assert!(rows.iter().all(|r| r.interpretation == NOT_SIGNIFICANT_LABEL));
}

#[test]
fn sweep_is_idempotent() {
    let pairs = two_day_lead(60, 3);
    let a = test_instrument("LEAD", &pairs, 4, 0.05).unwrap();
    let b = test_instrument("LEAD", &pairs, 4, 0.05).unwrap();
    assert_eq!(a, b);
}

#[test]
fn batch_matches_single_instrument_runs() {
    let mut map = BTreeMap::new();
    map.insert("BBB".to_string(), two_day_lead(50, 1));
    map.insert("AAA".to_string(), two_day_lead(50, 2));

    let batch = test_all(&map, 3, 0.05);
    assert!(batch.skipped.is_empty());
    assert_eq!(batch.results.len(), 6);

    let single = test_instrument("AAA", &map["AAA"], 3, 0.05).unwrap();
    assert_eq!(&batch.results[..3], single.as_slice());
    assert!(batch.significant().any(|r| r.ticker == "BBB" && r.lag_days == 2));
}

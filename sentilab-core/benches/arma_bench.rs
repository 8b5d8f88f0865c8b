//! Criterion benchmarks for the model-fitting hot paths.
//!
//! Benchmarks:
//! 1. Kalman filter likelihood pass
//! 2. Single ARMA / ARMAX fit
//! 3. Full order search
//! 4. Granger sweep for one instrument

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sentilab_core::arma::state_space::ArmaStateSpace;
use sentilab_core::arma::{fit, ArmaOrder, FitOptions};
use sentilab_core::granger::test_instrument;
use sentilab_core::order_selection::select_order;
use sentilab_core::series::AlignedPairs;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_returns(n: usize, seed: u64) -> (Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let mut y = vec![0.0; n];
    for t in 1..n {
        y[t] = 0.3 * y[t - 1] + 0.002 * x[t] + rng.gen_range(-0.01..0.01);
    }
    (y, x)
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_filter(c: &mut Criterion) {
    let (y, _) = make_returns(500, 1);
    let ss = ArmaStateSpace::new(&[0.3, 0.1], &[0.2]);
    c.bench_function("kalman_filter_arma21_500", |b| {
        b.iter(|| ss.filter(black_box(&y)))
    });
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    for n in [250usize, 1000] {
        let (y, x) = make_returns(n, 2);
        group.bench_with_input(BenchmarkId::new("arma11", n), &n, |b, _| {
            b.iter(|| fit(black_box(&y), None, ArmaOrder::new(1, 1), &FitOptions::default()))
        });
        group.bench_with_input(BenchmarkId::new("armax11", n), &n, |b, _| {
            b.iter(|| fit(black_box(&y), Some(&x), ArmaOrder::new(1, 1), &FitOptions::default()))
        });
    }
    group.finish();
}

fn bench_order_search(c: &mut Criterion) {
    let (y, _) = make_returns(250, 3);
    let mut group = c.benchmark_group("order_search");
    group.sample_size(10);
    group.bench_function("grid_3x3_250", |b| {
        b.iter(|| select_order(black_box(&y), 3, 3, &FitOptions::default()))
    });
    group.finish();
}

fn bench_granger(c: &mut Criterion) {
    let (y, x) = make_returns(750, 4);
    let pairs = AlignedPairs::from_vectors(y, x);
    c.bench_function("granger_sweep_lag5_750", |b| {
        b.iter(|| test_instrument("BENCH", black_box(&pairs), 5, 0.05))
    });
}

criterion_group!(benches, bench_filter, bench_fit, bench_order_search, bench_granger);
criterion_main!(benches);

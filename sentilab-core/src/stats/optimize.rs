//! Derivative-free minimisation (Nelder-Mead) and finite-difference Hessians.
//!
//! The likelihood surfaces of ARMA models are cheap to evaluate but awkward to
//! differentiate, so the fitter relies on a simplex search with an explicit
//! iteration budget. The budget is what bounds per-instrument runtime.

/// Options controlling a Nelder-Mead run.
#[derive(Debug, Clone, Copy)]
pub struct NelderMeadOptions {
    pub max_iterations: usize,
    /// Absolute tolerance on the simplex spread in parameter space.
    pub x_tol: f64,
    /// Absolute tolerance on the spread of objective values.
    pub f_tol: f64,
    /// Edge length of the initial simplex.
    pub initial_step: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            x_tol: 1e-6,
            f_tol: 1e-8,
            initial_step: 0.1,
        }
    }
}

/// Outcome of a minimisation.
#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimise `f` starting from `x0`.
///
/// Non-finite objective values are treated as +inf, which lets the objective
/// signal infeasible regions without a separate constraint channel.
pub fn nelder_mead<F>(f: F, x0: &[f64], opts: &NelderMeadOptions) -> Minimum
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    let eval = |x: &[f64]| {
        let v = f(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    if n == 0 {
        return Minimum {
            x: Vec::new(),
            value: eval(&[]),
            iterations: 0,
            converged: true,
        };
    }

    const ALPHA: f64 = 1.0;
    const GAMMA: f64 = 2.0;
    const RHO: f64 = 0.5;
    const SIGMA: f64 = 0.5;

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(x0.to_vec());
    for i in 0..n {
        let mut v = x0.to_vec();
        v[i] += opts.initial_step;
        simplex.push(v);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < opts.max_iterations {
        // Order vertices best to worst; stable sort keeps ties deterministic
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let f_spread = values
            .iter()
            .skip(1)
            .map(|v| (v - values[0]).abs())
            .fold(0.0_f64, f64::max);
        let x_spread = simplex
            .iter()
            .skip(1)
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0_f64, f64::max);
        if values[0].is_finite() && f_spread <= opts.f_tol && x_spread <= opts.x_tol {
            converged = true;
            break;
        }

        iterations += 1;

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();
        let worst = simplex[n].clone();
        let along = |t: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&worst)
                .map(|(c, w)| c + t * (c - w))
                .collect()
        };

        let reflected = along(ALPHA);
        let f_reflected = eval(&reflected);

        if f_reflected < values[0] {
            let expanded = along(GAMMA);
            let f_expanded = eval(&expanded);
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
            continue;
        }

        if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
            continue;
        }

        let (contracted, f_contracted) = if f_reflected < values[n] {
            let c = along(ALPHA * RHO);
            let fc = eval(&c);
            (c, fc)
        } else {
            let c = along(-RHO);
            let fc = eval(&c);
            (c, fc)
        };
        if f_contracted < values[n].min(f_reflected) {
            simplex[n] = contracted;
            values[n] = f_contracted;
            continue;
        }

        // Shrink toward the best vertex
        let best = simplex[0].clone();
        for i in 1..=n {
            simplex[i] = simplex[i]
                .iter()
                .zip(&best)
                .map(|(x, b)| b + SIGMA * (x - b))
                .collect();
            values[i] = eval(&simplex[i]);
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);

    Minimum {
        x: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}

/// Central finite-difference Hessian of `f` at `x`.
///
/// Returns `None` if any evaluation in the stencil is non-finite.
pub fn numerical_hessian<F>(f: F, x: &[f64]) -> Option<Vec<Vec<f64>>>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x.len();
    let h: Vec<f64> = x.iter().map(|v| 1e-4 * v.abs().max(1.0)).collect();
    let f0 = f(x);
    if !f0.is_finite() {
        return None;
    }

    let at = |shifts: &[(usize, f64)]| -> f64 {
        let mut p = x.to_vec();
        for &(i, d) in shifts {
            p[i] += d;
        }
        f(&p)
    };

    let mut hess = vec![vec![0.0; n]; n];
    for i in 0..n {
        let fp = at(&[(i, h[i])]);
        let fm = at(&[(i, -h[i])]);
        let v = (fp - 2.0 * f0 + fm) / (h[i] * h[i]);
        if !v.is_finite() {
            return None;
        }
        hess[i][i] = v;

        for j in (i + 1)..n {
            let fpp = at(&[(i, h[i]), (j, h[j])]);
            let fpm = at(&[(i, h[i]), (j, -h[j])]);
            let fmp = at(&[(i, -h[i]), (j, h[j])]);
            let fmm = at(&[(i, -h[i]), (j, -h[j])]);
            let v = (fpp - fpm - fmp + fmm) / (4.0 * h[i] * h[j]);
            if !v.is_finite() {
                return None;
            }
            hess[i][j] = v;
            hess[j][i] = v;
        }
    }
    Some(hess)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rosenbrock(x: &[f64]) -> f64 {
        (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2)
    }

    #[test]
    fn finds_rosenbrock_minimum() {
        let opts = NelderMeadOptions {
            max_iterations: 5000,
            ..Default::default()
        };
        let min = nelder_mead(rosenbrock, &[-1.2, 1.0], &opts);
        assert!(min.converged);
        assert!((min.x[0] - 1.0).abs() < 1e-3, "x = {:?}", min.x);
        assert!((min.x[1] - 1.0).abs() < 1e-3, "x = {:?}", min.x);
    }

    #[test]
    fn respects_iteration_budget() {
        let opts = NelderMeadOptions {
            max_iterations: 5,
            ..Default::default()
        };
        let min = nelder_mead(rosenbrock, &[-1.2, 1.0], &opts);
        assert!(!min.converged);
        assert_eq!(min.iterations, 5);
    }

    #[test]
    fn infinite_region_is_avoided() {
        // Minimum of (x-2)^2 restricted to x < 3
        let f = |x: &[f64]| {
            if x[0] >= 3.0 {
                f64::INFINITY
            } else {
                (x[0] - 2.0).powi(2)
            }
        };
        let min = nelder_mead(f, &[0.0], &NelderMeadOptions::default());
        assert!(min.converged);
        assert!((min.x[0] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn hessian_of_quadratic() {
        let f = |x: &[f64]| 3.0 * x[0] * x[0] + 2.0 * x[0] * x[1] + x[1] * x[1];
        let h = numerical_hessian(f, &[0.5, -0.5]).unwrap();
        assert!((h[0][0] - 6.0).abs() < 1e-4);
        assert!((h[0][1] - 2.0).abs() < 1e-4);
        assert!((h[1][1] - 2.0).abs() < 1e-4);
    }
}

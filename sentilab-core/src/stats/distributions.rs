//! Distribution tails for the hypothesis tests.
//!
//! The F survival function scores the Granger test; the normal CDF backs the
//! Wald z-test on ARMAX coefficients and the MacKinnon p-value surface.

use statrs::distribution::{ContinuousCDF, FisherSnedecor, Normal};

/// Upper tail of the F distribution: P(F > f) with (d1, d2) degrees of freedom.
///
/// Non-positive statistics map to 1.0, invalid degrees of freedom to NaN.
pub fn f_sf(f: f64, d1: f64, d2: f64) -> f64 {
    if f.is_nan() {
        return f64::NAN;
    }
    let Ok(dist) = FisherSnedecor::new(d1, d2) else {
        return f64::NAN;
    };
    if f <= 0.0 {
        return 1.0;
    }
    if f.is_infinite() {
        return 0.0;
    }
    dist.sf(f).clamp(0.0, 1.0)
}

/// Standard normal CDF.
pub fn normal_cdf(z: f64) -> f64 {
    Normal::new(0.0, 1.0).map_or(f64::NAN, |n| n.cdf(z))
}

/// Two-sided p-value of a z statistic under the standard normal.
pub fn two_sided_normal_p(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    Normal::new(0.0, 1.0).map_or(f64::NAN, |n| (2.0 * n.sf(z.abs())).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use statrs::distribution::StudentsT;

    #[test]
    fn f_with_one_numerator_df_is_squared_t() {
        // P(F(1, d) > t^2) = 2 * P(T(d) > t)
        let (t, df) = (2.1, 15.0);
        let student = StudentsT::new(0.0, 1.0, df).unwrap();
        let via_t = 2.0 * student.sf(t);
        let via_f = f_sf(t * t, 1.0, df);
        assert!((via_t - via_f).abs() < 1e-8, "{via_t} vs {via_f}");
    }

    #[test]
    fn f_sf_known_critical_value() {
        // F(2, 20) upper 5% critical value is 3.4928
        let p = f_sf(3.4928, 2.0, 20.0);
        assert!((p - 0.05).abs() < 1e-4, "p = {p}");
    }

    #[test]
    fn f_sf_edges() {
        assert_eq!(f_sf(0.0, 3.0, 10.0), 1.0);
        assert_eq!(f_sf(-1.0, 3.0, 10.0), 1.0);
        assert_eq!(f_sf(f64::INFINITY, 3.0, 10.0), 0.0);
        assert!(f_sf(1.0, 0.0, 10.0).is_nan());
        assert!(f_sf(f64::NAN, 3.0, 10.0).is_nan());
    }

    #[test]
    fn normal_cdf_known_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-4);
        assert!((normal_cdf(-1.6449) - 0.05).abs() < 1e-4);
    }

    #[test]
    fn two_sided_p_at_common_cutoffs() {
        assert!((two_sided_normal_p(1.96) - 0.05).abs() < 1e-3);
        assert!((two_sided_normal_p(-1.96) - 0.05).abs() < 1e-3);
        assert!((two_sided_normal_p(0.0) - 1.0).abs() < 1e-12);
        assert!(two_sided_normal_p(f64::NAN).is_nan());
    }
}

//! # Ordinary least squares
//!
//! A minimal OLS solver on top of `nalgebra`'s SVD, used for:
//!
//! * the stimulus **plane fit** `z ≈ a·x + b·y + c`
//!   ([`TrajectoryClassifier`](crate::classification::TrajectoryClassifier));
//! * the **target-distance** regression `d ≈ p1 + p2·f + p3·f²`
//!   ([`SegmentExtractor`](crate::segments::SegmentExtractor)).
//!
//! Degenerate systems (fewer rows than unknowns, rank-deficient design matrix, constant
//! response) return `None`; callers turn that into their sentinel values.
use nalgebra::{DMatrix, DVector};

/// Relative threshold under which a singular value is considered zero.
const RANK_EPS: f64 = 1e-10;

/// Result of a least-squares fit.
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    /// Fitted coefficients, in the column order of the design matrix.
    pub params: Vec<f64>,
    /// Coefficient of determination (centered total sum of squares).
    pub r2: f64,
}

/// Fit `y ≈ X·β` in the least-squares sense.
///
/// Arguments
/// -----------------
/// * `design`: the `n × k` design matrix (include a column of ones for an intercept).
/// * `response`: the `n` observed values.
///
/// Return
/// ----------
/// * `Some(OlsFit)` for a well-posed system.
/// * `None` if `n < k`, if the design matrix does not have full column rank, if the
///   response has zero variance, or if any input is non-finite.
pub fn ols(design: &DMatrix<f64>, response: &DVector<f64>) -> Option<OlsFit> {
    let (n, k) = design.shape();
    if n < k || k == 0 || response.len() != n {
        return None;
    }
    if design.iter().chain(response.iter()).any(|v| !v.is_finite()) {
        return None;
    }

    let mean = response.mean();
    let ss_tot: f64 = response.iter().map(|v| (v - mean).powi(2)).sum();
    if ss_tot <= 0.0 {
        return None;
    }

    let svd = design.clone().svd(true, true);
    let s_max = svd.singular_values.max();
    let eps = RANK_EPS * s_max * n.max(k) as f64;
    if s_max <= 0.0 || svd.rank(eps) < k {
        return None;
    }
    let beta = svd.solve(response, eps).ok()?;

    let residuals = response - design * &beta;
    let ss_res = residuals.norm_squared();

    Some(OlsFit {
        params: beta.iter().copied().collect(),
        r2: 1.0 - ss_res / ss_tot,
    })
}

/// Fit the plane `z ≈ a·x + b·y + c`; coefficients are returned as `[a, b, c]`.
pub fn fit_plane(x: &[f64], y: &[f64], z: &[f64]) -> Option<OlsFit> {
    let n = z.len();
    if x.len() != n || y.len() != n {
        return None;
    }
    let design = DMatrix::from_fn(n, 3, |i, j| match j {
        0 => x[i],
        1 => y[i],
        _ => 1.0,
    });
    ols(&design, &DVector::from_column_slice(z))
}

/// Fit `d ≈ p1 + p2·t + p3·t²`; coefficients are returned as `[p1, p2, p3]`.
pub fn fit_quadratic(t: &[f64], d: &[f64]) -> Option<OlsFit> {
    let n = d.len();
    if t.len() != n {
        return None;
    }
    let design = DMatrix::from_fn(n, 3, |i, j| t[i].powi(j as i32));
    ols(&design, &DVector::from_column_slice(d))
}

#[cfg(test)]
mod regression_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_plane() {
        let x: Vec<f64> = (0..20).map(|i| (i % 5) as f64 * 10.0).collect();
        let y: Vec<f64> = (0..20).map(|i| (i / 5) as f64 * 7.0).collect();
        let z: Vec<f64> = x
            .iter()
            .zip(&y)
            .map(|(x, y)| 0.2 * x + 0.5 * y + 300.0)
            .collect();

        let fit = fit_plane(&x, &y, &z).unwrap();
        assert_relative_eq!(fit.params[0], 0.2, epsilon = 1e-9);
        assert_relative_eq!(fit.params[1], 0.5, epsilon = 1e-9);
        assert_relative_eq!(fit.params[2], 300.0, epsilon = 1e-6);
        assert_relative_eq!(fit.r2, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rank_deficient_plane() {
        // x and y are constant: only the intercept is identifiable
        let x = vec![0.0; 10];
        let y = vec![0.0; 10];
        let z: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert!(fit_plane(&x, &y, &z).is_none());
    }

    #[test]
    fn test_too_few_rows() {
        assert!(fit_plane(&[1.0, 2.0], &[0.0, 1.0], &[3.0, 4.0]).is_none());
    }

    #[test]
    fn test_constant_response() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..10).map(|i| (i * i) as f64).collect();
        assert!(fit_plane(&x, &y, &[5.0; 10]).is_none());
    }

    #[test]
    fn test_quadratic() {
        let t: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let d: Vec<f64> = t.iter().map(|t| 400.0 - 3.0 * t + 0.05 * t * t).collect();
        let fit = fit_quadratic(&t, &d).unwrap();
        assert_relative_eq!(fit.params[0], 400.0, epsilon = 1e-6);
        assert_relative_eq!(fit.params[1], -3.0, epsilon = 1e-8);
        assert_relative_eq!(fit.params[2], 0.05, epsilon = 1e-9);
        assert_relative_eq!(fit.r2, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_noisy_r2_below_one() {
        let t: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let d: Vec<f64> = t
            .iter()
            .enumerate()
            .map(|(i, t)| 2.0 * t + if i % 2 == 0 { 3.0 } else { -3.0 })
            .collect();
        let fit = fit_quadratic(&t, &d).unwrap();
        assert!(fit.r2 > 0.9 && fit.r2 < 1.0);
    }
}

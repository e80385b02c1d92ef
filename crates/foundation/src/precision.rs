//! Floating-point tolerances shared by the geometry and editing code.

/// Tolerance for orientation (cross product) tests in segment intersection.
pub const ORIENTATION_EPSILON: f64 = 1e-10;

/// Tolerance used when comparing two versions of a vertex list to find the
/// polygon an edit touched.
pub const VERTEX_DIFF_TOLERANCE: f64 = 1e-9;

/// Sign of `v` with values within `eps` of zero treated as zero.
#[inline]
pub fn sign_with_tolerance(v: f64, eps: f64) -> i8 {
    if v > eps {
        1
    } else if v < -eps {
        -1
    } else {
        0
    }
}

#[inline]
pub fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

/// Component-wise comparison of two 2D points.
#[inline]
pub fn approx_eq_point(a: [f64; 2], b: [f64; 2], tol: f64) -> bool {
    approx_eq(a[0], b[0], tol) && approx_eq(a[1], b[1], tol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_collapses_small_values() {
        assert_eq!(sign_with_tolerance(1e-12, ORIENTATION_EPSILON), 0);
        assert_eq!(sign_with_tolerance(-1e-3, ORIENTATION_EPSILON), -1);
        assert_eq!(sign_with_tolerance(2.0, ORIENTATION_EPSILON), 1);
    }

    #[test]
    fn point_comparison_uses_tolerance() {
        assert!(approx_eq_point([1.0, 2.0], [1.0 + 1e-12, 2.0], VERTEX_DIFF_TOLERANCE));
        assert!(!approx_eq_point([1.0, 2.0], [1.0, 2.001], VERTEX_DIFF_TOLERANCE));
    }
}

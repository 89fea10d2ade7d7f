//! Kahan-style compensated summation.
//!
//! Every long-running accumulator in this crate (`State::x`, `State::v`,
//! `State::jac_step`, `State::dqdt`, and the per-pair 14-row submatrices
//! folded back into them) carries a residual term alongside it so that
//! round-off behaves as a random walk rather than a one-directional drift.
//! This is the one numeric primitive every other module in the crate builds
//! on; keep it dependency-free and branch-free.

use nalgebra::{DMatrix, DVector};

/// Kahan two-sum: given a running value `y`, its residual `e`, and an
/// increment `delta`, returns `(y_new, e_new)` such that
/// `y_new + e_new == y + e + delta` to within one ULP of `y_new`.
#[inline]
pub fn csum(y: f64, e: f64, delta: f64) -> (f64, f64) {
    let t = y + (e + delta);
    let e_new = (y - t) + (e + delta);
    (t, e_new)
}

/// Apply [`csum`] element-wise to an `f64` slice and its error companion,
/// folding in `delta` at each index. Panics if the three slices differ in
/// length, matching the teacher's convention of treating mismatched buffer
/// shapes as a caller contract violation rather than a recoverable error.
pub fn csum_slice(y: &mut [f64], e: &mut [f64], delta: &[f64]) {
    assert_eq!(y.len(), e.len());
    assert_eq!(y.len(), delta.len());
    for i in 0..y.len() {
        let (yi, ei) = csum(y[i], e[i], delta[i]);
        y[i] = yi;
        e[i] = ei;
    }
}

/// Fold a single scalar `delta` into one element of `y`/`e` via [`csum`].
#[inline]
pub fn csum_into(y: &mut f64, e: &mut f64, delta: f64) {
    let (yi, ei) = csum(*y, *e, delta);
    *y = yi;
    *e = ei;
}

/// Matrix-broadcast form of [`csum`], used to fold a freshly multiplied
/// local-Jacobian update into the running `jac_step`/`jac_error` pair.
pub fn csum_matrix(y: &mut DMatrix<f64>, e: &mut DMatrix<f64>, delta: &DMatrix<f64>) {
    assert_eq!(y.shape(), e.shape());
    assert_eq!(y.shape(), delta.shape());
    for idx in 0..y.len() {
        let (yi, ei) = csum(y[idx], e[idx], delta[idx]);
        y[idx] = yi;
        e[idx] = ei;
    }
}

/// Vector form of [`csum`], used for `dqdt`/`dqdt_error`.
pub fn csum_vector(y: &mut DVector<f64>, e: &mut DVector<f64>, delta: &DVector<f64>) {
    assert_eq!(y.len(), e.len());
    assert_eq!(y.len(), delta.len());
    for idx in 0..y.len() {
        let (yi, ei) = csum(y[idx], e[idx], delta[idx]);
        y[idx] = yi;
        e[idx] = ei;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn csum_exact_for_well_scaled_inputs() {
        let (y, e) = csum(1.0, 0.0, 1e-16);
        assert_abs_diff_eq!(y + e, 1.0 + 1e-16, epsilon = 0.0);
    }

    #[test]
    fn csum_recovers_small_increment_lost_to_rounding() {
        // 1.0 + 1e-17 rounds away to 1.0 in plain f64 addition, but the
        // compensated residual must still record it.
        let mut y = 1.0;
        let mut e = 0.0;
        for _ in 0..10 {
            csum_into(&mut y, &mut e, 1e-17);
        }
        // Ten additions of 1e-17 sum to 1e-16, which is representable
        // relative to 1.0 and must show up once folded through e.
        assert!(y + e > 1.0);
    }

    #[test]
    fn csum_matches_plain_sum_for_large_values() {
        let mut y = 0.0;
        let mut e = 0.0;
        let mut reference = 0.0;
        for i in 0..1000 {
            let delta = (i as f64) * 0.001;
            csum_into(&mut y, &mut e, delta);
            reference += delta;
        }
        assert_abs_diff_eq!(y + e, reference, epsilon = 1e-9);
    }

    #[test]
    fn csum_matrix_matches_elementwise_csum() {
        let mut y = DMatrix::from_element(2, 2, 1.0);
        let mut e = DMatrix::zeros(2, 2);
        let delta = DMatrix::from_element(2, 2, 1e-12);
        csum_matrix(&mut y, &mut e, &delta);
        for idx in 0..4 {
            assert_abs_diff_eq!(y[idx] + e[idx], 1.0 + 1e-12, epsilon = 1e-20);
        }
    }
}

//! Analytic 6x8 Jacobian of the Kepler-drift increment Delta(x,v) with
//! respect to `(x0, v0, k, h)` (spec `# 4.4`), plus the separately-derived
//! mass-column 6-vector.
//!
//! Rather than hand-expanding roughly 48 partial-derivative formulas, this
//! differentiates the same formulas `kepler::gamma::jac_delxv_gamma`
//! evaluates, mechanically, via the forward-mode dual numbers in
//! `kepler::dual` (grounded on `hinsley-Fork/crates/fork_core/src/
//! autodiff.rs`). `gamma` itself is Newton-solved, not an explicit function
//! of the inputs, so it is differentiated by the implicit function theorem:
//! since `F(gamma; x0,v0,k,h) = 0` along the solution, `dgamma/dp =
//! -(dF/dp)|_gamma_fixed / (dF/dgamma)`, and `dF/dgamma = r` is already
//! known from the converged solve. Each column is therefore two dual-number
//! evaluations: one holding `gamma` fixed to get `dF/dp`, one feeding
//! `gamma`'s now-known total derivative back in to get the total
//! derivative of Delta(x,v).

use nalgebra::DMatrix;

use super::dual::{g_functions_dual, Dual};
use super::gamma::GammaSolution;

fn dot3_dual(a: [Dual; 3], b: [Dual; 3]) -> Dual {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// One parameter column's full Delta(x,v) in dual form, differentiated with
/// respect to whichever of the 8 inputs carries a `var`/nonzero `d`.
#[allow(clippy::too_many_arguments)]
fn delxv_dual(
    x0: [Dual; 3],
    v0: [Dual; 3],
    k: Dual,
    h: Dual,
    gamma: Dual,
    drift_first: bool,
) -> [Dual; 6] {
    let xp = if drift_first {
        [
            x0[0] - h * v0[0],
            x0[1] - h * v0[1],
            x0[2] - h * v0[2],
        ]
    } else {
        x0
    };
    let r0 = dot3_dual(xp, xp).sqrt();
    let eta = dot3_dual(xp, v0);
    let beta = (k * 2.0) / r0 - dot3_dual(v0, v0);

    let g = g_functions_dual(beta, gamma);
    let r = r0 * g.g0 + eta * g.g1 + k * g.g2;

    let f = Dual::c(1.0) - (k / r0) * g.g2;
    let gcoef = h - k * g.g3;
    let fdot = -((k / (r0 * r)) * g.g1);
    let gdot = Dual::c(1.0) - (k / r) * g.g2;

    let mut out = [Dual::c(0.0); 6];
    if drift_first {
        for i in 0..3 {
            out[i] = (f - 1.0) * x0[i] + (gcoef - f * h) * v0[i];
            out[3 + i] = fdot * x0[i] + (gdot - 1.0 - fdot * h) * v0[i];
        }
    } else {
        for i in 0..3 {
            out[i] = (f - 1.0) * x0[i] + gcoef * v0[i];
            out[3 + i] = fdot * x0[i] + (gdot - 1.0) * v0[i];
        }
    }
    out
}

/// Explicit partial `dF/dp` at fixed `gamma`, used to find `dgamma/dp` via
/// the implicit function theorem. `F = r0*G1 + eta*G2 + k*G3 - h`.
fn df_dp(x0: [Dual; 3], v0: [Dual; 3], k: Dual, h: Dual, gamma_fixed: f64, drift_first: bool) -> f64 {
    let xp = if drift_first {
        [
            x0[0] - h * v0[0],
            x0[1] - h * v0[1],
            x0[2] - h * v0[2],
        ]
    } else {
        x0
    };
    let r0 = dot3_dual(xp, xp).sqrt();
    let eta = dot3_dual(xp, v0);
    let beta = (k * 2.0) / r0 - dot3_dual(v0, v0);
    let gamma = Dual::c(gamma_fixed);
    let g = g_functions_dual(beta, gamma);
    let f = r0 * g.g1 + eta * g.g2 + k * g.g3 - h;
    f.d
}

/// Compute the 6x8 Jacobian of Delta(x,v) into `jac_out` (caller-owned
/// scratch, shape `(6, 8)` — `Derivatives::jac_kepler`) and return the
/// separately-derived mass-column 6-vector, given the already-converged
/// [`GammaSolution`] and the original (non-dual) inputs.
pub fn compute_jacobian_gamma(
    x0: [f64; 3],
    v0: [f64; 3],
    k: f64,
    h: f64,
    drift_first: bool,
    solution: &GammaSolution,
    jac_out: &mut DMatrix<f64>,
) -> [f64; 6] {
    debug_assert_eq!(jac_out.shape(), (6, 8));

    for col in 0..8 {
        let mut x0d = [Dual::c(x0[0]), Dual::c(x0[1]), Dual::c(x0[2])];
        let mut v0d = [Dual::c(v0[0]), Dual::c(v0[1]), Dual::c(v0[2])];
        let mut kd = Dual::c(k);
        let mut hd = Dual::c(h);
        match col {
            0..=2 => x0d[col] = Dual::var(x0[col]),
            3..=5 => v0d[col - 3] = Dual::var(v0[col - 3]),
            6 => kd = Dual::var(k),
            7 => hd = Dual::var(h),
            _ => unreachable!(),
        }

        let df = df_dp(x0d, v0d, kd, hd, solution.gamma, drift_first);
        let dgamma_dp = -df / solution.r;
        let gamma_dual = Dual {
            v: solution.gamma,
            d: dgamma_dp,
        };

        let delxv = delxv_dual(x0d, v0d, kd, hd, gamma_dual, drift_first);
        for row in 0..6 {
            jac_out[(row, col)] = delxv[row].d;
        }
    }

    jac_mass_column(x0, v0, k, h, drift_first, solution)
}

/// Separately-derived, cancellation-safe closed form for the mass/k column
/// (spec `# 9`'s "mass column precision trick"). The generic per-parameter
/// loop above reads `f` as `Dual::c(1.0) - (k/r0)*g2` and then subtracts
/// `1.0` back out to form `(f - 1.0)`, round-tripping the small quantity
/// `(k/r0)*g2` through a value near unity (likewise `gdot - 1.0`). This
/// instead differentiates `f-1`, `gcoef`, `fdot`, and `gdot-1` directly as
/// functions of `k` — using `g_functions_dual` only to obtain `dGn/dbeta`
/// and `dGn/dgamma` at the converged solution, then composing the chain
/// rule by hand in plain `f64` — so the near-unity subtraction never
/// happens and the mass-column entries keep their full relative precision
/// even when `k` is small relative to `h`.
fn jac_mass_column(
    x0: [f64; 3],
    v0: [f64; 3],
    k: f64,
    h: f64,
    drift_first: bool,
    solution: &GammaSolution,
) -> [f64; 6] {
    let xp = if drift_first {
        [x0[0] - h * v0[0], x0[1] - h * v0[1], x0[2] - h * v0[2]]
    } else {
        x0
    };
    let r0 = (xp[0] * xp[0] + xp[1] * xp[1] + xp[2] * xp[2]).sqrt();
    let eta = xp[0] * v0[0] + xp[1] * v0[1] + xp[2] * v0[2];

    let gamma = solution.gamma;
    let beta = solution.beta;
    let r = solution.r;

    // dGn/dbeta (gamma held fixed) and dGn/dgamma (beta held fixed), read
    // off the `.d` component of two narrow single-variable dual passes.
    let g_wrt_beta = g_functions_dual(Dual::var(beta), Dual::c(gamma));
    let g_wrt_gamma = g_functions_dual(Dual::c(beta), Dual::var(gamma));
    let g1 = g_wrt_beta.g1.v;
    let g2 = g_wrt_beta.g2.v;
    let g3 = g_wrt_beta.g3.v;

    let dbeta_dk = 2.0 / r0;

    // dF/dk at fixed gamma, then dgamma/dk via the implicit function
    // theorem (dF/dgamma = r is already known from the converged solve).
    let df_dk_fixed_gamma =
        r0 * g_wrt_beta.g1.d * dbeta_dk + eta * g_wrt_beta.g2.d * dbeta_dk + g3 + k * g_wrt_beta.g3.d * dbeta_dk;
    let dgamma_dk = -df_dk_fixed_gamma / r;

    let dg0_dk = g_wrt_beta.g0.d * dbeta_dk + g_wrt_gamma.g0.d * dgamma_dk;
    let dg1_dk = g_wrt_beta.g1.d * dbeta_dk + g_wrt_gamma.g1.d * dgamma_dk;
    let dg2_dk = g_wrt_beta.g2.d * dbeta_dk + g_wrt_gamma.g2.d * dgamma_dk;
    let dg3_dk = g_wrt_beta.g3.d * dbeta_dk + g_wrt_gamma.g3.d * dgamma_dk;

    let dr_dk = r0 * dg0_dk + eta * dg1_dk + g2 + k * dg2_dk;

    // f - 1 = -(k/r0)*g2: differentiate the product directly.
    let d_f_minus_1_dk = -(g2 / r0 + (k / r0) * dg2_dk);
    let dgcoef_dk = -(g3 + k * dg3_dk);

    // fdot = -(k/(r0*r))*g1 and gdot - 1 = -(k/r)*g2 are both quotients in
    // k; quotient-rule each directly rather than forming fdot/gdot and
    // subtracting a near-unity term back out.
    let u = k / (r0 * r);
    let du_dk = (r - k * dr_dk) / (r0 * r * r);
    let dfdot_dk = -(du_dk * g1 + u * dg1_dk);

    let w = k / r;
    let dw_dk = (r - k * dr_dk) / (r * r);
    let d_gdot_minus_1_dk = -(dw_dk * g2 + w * dg2_dk);

    let mut out = [0.0; 6];
    if drift_first {
        for i in 0..3 {
            out[i] = d_f_minus_1_dk * x0[i] + (dgcoef_dk - h * d_f_minus_1_dk) * v0[i];
            out[3 + i] = dfdot_dk * x0[i] + (d_gdot_minus_1_dk - h * dfdot_dk) * v0[i];
        }
    } else {
        for i in 0..3 {
            out[i] = d_f_minus_1_dk * x0[i] + dgcoef_dk * v0[i];
            out[3 + i] = dfdot_dk * x0[i] + d_gdot_minus_1_dk * v0[i];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kepler::gamma::jac_delxv_gamma;
    use approx::assert_relative_eq;

    fn finite_difference_column(
        x0: [f64; 3],
        v0: [f64; 3],
        k: f64,
        h: f64,
        drift_first: bool,
        perturb: impl Fn([f64; 3], [f64; 3], f64, f64) -> ([f64; 3], [f64; 3], f64, f64),
    ) -> [f64; 6] {
        let eps = 1e-6;
        let (x0p, v0p, kp, hp) = perturb(x0, v0, k, h);
        let (x0m, v0m, km, hm) = perturb(x0, v0, k, h);
        let plus = jac_delxv_gamma(
            [x0[0] + x0p[0] * eps, x0[1] + x0p[1] * eps, x0[2] + x0p[2] * eps],
            [v0[0] + v0p[0] * eps, v0[1] + v0p[1] * eps, v0[2] + v0p[2] * eps],
            k + kp * eps,
            h + hp * eps,
            drift_first,
        );
        let minus = jac_delxv_gamma(
            [x0[0] - x0m[0] * eps, x0[1] - x0m[1] * eps, x0[2] - x0m[2] * eps],
            [v0[0] - v0m[0] * eps, v0[1] - v0m[1] * eps, v0[2] - v0m[2] * eps],
            k - km * eps,
            h - hm * eps,
            drift_first,
        );
        let mut out = [0.0; 6];
        for i in 0..6 {
            out[i] = (plus.delxv[i] - minus.delxv[i]) / (2.0 * eps);
        }
        out
    }

    #[test]
    fn jacobian_matches_finite_difference_for_direct_branch() {
        let x0 = [1.0, 0.2, 0.0];
        let v0 = [0.1, 0.9, 0.0];
        let k = 1.0;
        let h = 0.05;
        let kd = jac_delxv_gamma(x0, v0, k, h, false);
        let mut jac = DMatrix::zeros(6, 8);
        compute_jacobian_gamma(x0, v0, k, h, false, &kd.solution, &mut jac);

        let fd_x0_0 = finite_difference_column(x0, v0, k, h, false, |_, _, _, _| {
            ([1.0, 0.0, 0.0], [0.0, 0.0, 0.0], 0.0, 0.0)
        });
        for row in 0..6 {
            assert_relative_eq!(jac[(row, 0)], fd_x0_0[row], epsilon = 1e-5, max_relative = 1e-4);
        }

        let fd_h = finite_difference_column(x0, v0, k, h, false, |_, _, _, _| {
            ([0.0, 0.0, 0.0], [0.0, 0.0, 0.0], 0.0, 1.0)
        });
        for row in 0..6 {
            assert_relative_eq!(jac[(row, 7)], fd_h[row], epsilon = 1e-5, max_relative = 1e-4);
        }
    }

    #[test]
    fn jacobian_matches_finite_difference_for_drift_first_branch() {
        let x0 = [1.0, 0.0, 0.0];
        let v0 = [0.0, 1.0, 0.0];
        let k = 1.0;
        let h = 0.03;
        let kd = jac_delxv_gamma(x0, v0, k, h, true);
        let mut jac = DMatrix::zeros(6, 8);
        compute_jacobian_gamma(x0, v0, k, h, true, &kd.solution, &mut jac);

        let fd_v0_1 = finite_difference_column(x0, v0, k, h, true, |_, _, _, _| {
            ([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], 0.0, 0.0)
        });
        for row in 0..6 {
            assert_relative_eq!(jac[(row, 4)], fd_v0_1[row], epsilon = 1e-5, max_relative = 1e-4);
        }
    }

    #[test]
    fn jac_mass_matches_finite_difference_of_k() {
        let x0 = [1.0, 0.0, 0.0];
        let v0 = [0.0, 1.0, 0.0];
        let k = 1.0;
        let h = 0.02;
        let kd = jac_delxv_gamma(x0, v0, k, h, false);
        let mut jac = DMatrix::zeros(6, 8);
        let jac_mass = compute_jacobian_gamma(x0, v0, k, h, false, &kd.solution, &mut jac);

        let eps = 1e-6;
        let plus = jac_delxv_gamma(x0, v0, k + eps, h, false);
        let minus = jac_delxv_gamma(x0, v0, k - eps, h, false);
        for row in 0..6 {
            let fd = (plus.delxv[row] - minus.delxv[row]) / (2.0 * eps);
            assert_relative_eq!(jac_mass[row], fd, epsilon = 1e-5, max_relative = 1e-4);
        }
    }
}

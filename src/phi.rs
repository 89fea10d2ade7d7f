//! The two 4th-order correction operators (spec `# 4.8`): `Phi_c` over
//! tight (fast-kick) pairs and `Phi_alpha` (alpha=2) over Kepler pairs.
//! Composed together at the same `h` in `step::step`, they cancel the
//! leading-order error the Drift-Kick-Kepler split leaves behind.
//!
//! The physical velocity update (step 2/4) consumes `state.a` directly, as
//! computed once by [`compute_accelerations`]. `jac_phi`'s "five families of
//! partials" (spec `# 4.8` step 3) are built one parameter column at a time
//! by re-running the pairwise impulse formula over
//! [`crate::kepler::dual::Dual`] inputs, but the acceleration each pair
//! needs is not re-derived through that column's position/mass duals —
//! it is seeded directly from `dadq`'s already-computed closed-form
//! sensitivity `d(a_i)/d(param)`, with only the remaining `rij`/`fac2`/
//! impulse algebra differentiated through duals. This is what makes `dadq`
//! (and `state.a`) the thing `jac_phi` is actually built from, rather than
//! a quantity kept only for its own sake.

use crate::compensated::csum_into;
use crate::derivatives::{dadq_index, Derivatives};
use crate::kepler::dual::Dual;
use crate::state::{State, BLOCK};

/// Which corrector is being applied; selects the pairwise subset (spec
/// `# 4.8` step 1) and the `fac2` formula (step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhiKind {
    /// `Phi_c`: sums over pairs with `pair[i,j] == true` (fast-kick pairs).
    Corrector,
    /// `Phi_alpha` with `alpha = 2`: sums over pairs with
    /// `pair[i,j] == false` (Kepler pairs).
    Alpha,
}

#[inline]
fn selected(pair: &[bool], n: usize, i: usize, j: usize, kind: PhiKind) -> bool {
    let flagged = pair[i * n + j];
    match kind {
        PhiKind::Corrector => flagged,
        PhiKind::Alpha => !flagged,
    }
}

fn dot3(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Step 1: per-body acceleration over the selected pair subset, written
/// into `state.a` (flattened `[3,n]`, body-major). Consumed directly by
/// [`physical_delta_v`] and [`delta_v_column`] (via `dadq`'s seed value), not
/// recomputed.
fn compute_accelerations(state: &mut State, pair: &[bool], g_const: f64, kind: PhiKind) {
    let n = state.n;
    state.a.iter_mut().for_each(|v| *v = 0.0);
    for i in 0..n {
        for j in 0..n {
            if i == j || !selected(pair, n, i, j, kind) {
                continue;
            }
            let mut rij = [0.0; 3];
            for k in 0..3 {
                rij[k] = state.x[3 * i + k] - state.x[3 * j + k];
            }
            let r2 = dot3(rij, rij);
            if r2 == 0.0 {
                continue;
            }
            let r3inv = 1.0 / (r2 * r2.sqrt());
            for k in 0..3 {
                state.a[3 * i + k] -= g_const * state.m[j] * rij[k] * r3inv;
            }
        }
    }
}

/// Step 1 (continued): the dense `dadq[k,i,p,j]` tensor (closed analytic
/// form, spec `# 3`/`# 4.8`). `p in 0..3` is `d(a_i,k)/d(x_j,p)`, `p == 3`
/// is `d(a_i,k)/d(m_j)`. This is the acceleration-sensitivity family
/// [`delta_v_column`] seeds its duals from to assemble `jac_phi`.
fn build_dadq(state: &State, pair: &[bool], g_const: f64, kind: PhiKind, derivs: &mut Derivatives) {
    let n = state.n;
    for i in 0..n {
        for j in 0..n {
            if i == j || !selected(pair, n, i, j, kind) {
                continue;
            }
            let mut rij = [0.0; 3];
            for k in 0..3 {
                rij[k] = state.x[3 * i + k] - state.x[3 * j + k];
            }
            let r2 = dot3(rij, rij);
            if r2 == 0.0 {
                continue;
            }
            let r = r2.sqrt();
            let r3inv = 1.0 / (r2 * r);
            let r5inv = r3inv / r2;
            let mj = state.m[j];
            for k in 0..3 {
                for p in 0..3 {
                    let diag = if k == p { r3inv } else { 0.0 };
                    let tensor = diag - 3.0 * r5inv * rij[k] * rij[p];
                    // Off-diagonal: d(a_i,k)/d(x_j,p).
                    let off = g_const * mj * tensor;
                    let idx_j = dadq_index(n, k, i, p, j);
                    let idx_i = dadq_index(n, k, i, p, i);
                    derivs.dadq[idx_j] += off;
                    // Diagonal: d(a_i,k)/d(x_i,p) accumulates -off over every
                    // neighbor j (a_i's own-position dependence).
                    derivs.dadq[idx_i] -= off;
                }
                // d(a_i,k)/d(m_j) = -G*rij_k/r^3 (no self-mass dependence).
                let idx_m = dadq_index(n, k, i, 3, j);
                derivs.dadq[idx_m] += -g_const * rij[k] * r3inv;
            }
        }
    }
}

/// Step 2/4: the physical `Delta(v)` for every body, written into
/// `dv_out` (plain `f64`, no duals — this is the value the orbit actually
/// takes, not a derivative). Consumes `state.a` directly.
fn physical_delta_v(state: &State, pair: &[bool], g_const: f64, h: f64, kind: PhiKind, dv_out: &mut [[f64; 3]]) {
    let n = state.n;
    dv_out.iter_mut().for_each(|v| *v = [0.0; 3]);
    let h3g = h * h * h;
    for i in 0..n {
        for j in (i + 1)..n {
            if !selected(pair, n, i, j, kind) {
                continue;
            }
            let mut rij = [0.0; 3];
            for k in 0..3 {
                rij[k] = state.x[3 * i + k] - state.x[3 * j + k];
            }
            let r2 = dot3(rij, rij);
            let r = r2.sqrt();
            let r5 = r2 * r2 * r;
            let mut aij = [0.0; 3];
            for k in 0..3 {
                aij[k] = state.a[3 * i + k] - state.a[3 * j + k];
            }
            let aij_dot_rij = dot3(aij, rij);
            let fac2 = match kind {
                PhiKind::Corrector => aij_dot_rij * 3.0,
                PhiKind::Alpha => (state.m[i] + state.m[j]) * (2.0 * g_const) / r + aij_dot_rij * 3.0,
            };
            let fac1 = (h3g * g_const) / r5;
            for k in 0..3 {
                let impulse = fac1 * (rij[k] * fac2 - aij[k] * r2);
                dv_out[i][k] += impulse * state.m[j];
                dv_out[j][k] -= impulse * state.m[i];
            }
        }
    }
}

/// One `jac_phi` column's `Delta(v)`, differentiated with respect to body
/// `param_body`'s position axis `param_axis` (`0..3`) or mass
/// (`param_axis == 3`), written into `dv_out`. Rather than re-deriving each
/// pair's acceleration from raw position/mass duals (which would redo the
/// O(n) acceleration sum for every one of the `4n` columns), the
/// acceleration values come from `state.a` with their derivative component
/// read directly out of `dadq` — the quantity `dadq` exists to provide.
/// Only `rij` (direct position dependence) and the impulse-formula algebra
/// itself are differentiated through duals here.
#[allow(clippy::too_many_arguments)]
fn delta_v_column(
    state: &State,
    dadq: &[f64],
    pair: &[bool],
    g_const: f64,
    h: f64,
    kind: PhiKind,
    param_body: usize,
    param_axis: usize,
    dv_out: &mut [[Dual; 3]],
) {
    let n = state.n;
    dv_out.iter_mut().for_each(|v| *v = [Dual::c(0.0); 3]);
    let h3g = h * h * h;

    let mass_dual = |b: usize| -> Dual {
        if param_axis == 3 && b == param_body {
            Dual::var(state.m[b])
        } else {
            Dual::c(state.m[b])
        }
    };

    for i in 0..n {
        for j in (i + 1)..n {
            if !selected(pair, n, i, j, kind) {
                continue;
            }

            let mut rij = [Dual::c(0.0); 3];
            for k in 0..3 {
                let v = state.x[3 * i + k] - state.x[3 * j + k];
                let d = if param_axis < 3 {
                    let di = if i == param_body && k == param_axis { 1.0 } else { 0.0 };
                    let dj = if j == param_body && k == param_axis { 1.0 } else { 0.0 };
                    di - dj
                } else {
                    0.0
                };
                rij[k] = Dual { v, d };
            }
            let r2 = rij[0] * rij[0] + rij[1] * rij[1] + rij[2] * rij[2];
            let r = r2.sqrt();
            let r5 = r2 * r2 * r;

            let mut aij = [Dual::c(0.0); 3];
            for k in 0..3 {
                let ai = Dual {
                    v: state.a[3 * i + k],
                    d: dadq[dadq_index(n, k, i, param_axis, param_body)],
                };
                let aj = Dual {
                    v: state.a[3 * j + k],
                    d: dadq[dadq_index(n, k, j, param_axis, param_body)],
                };
                aij[k] = ai - aj;
            }
            let aij_dot_rij = aij[0] * rij[0] + aij[1] * rij[1] + aij[2] * rij[2];
            let mi_d = mass_dual(i);
            let mj_d = mass_dual(j);
            let fac2 = match kind {
                PhiKind::Corrector => aij_dot_rij * 3.0,
                PhiKind::Alpha => (mi_d + mj_d) * (2.0 * g_const) / r + aij_dot_rij * 3.0,
            };
            let fac1 = r5.recip() * (h3g * g_const);
            for k in 0..3 {
                let impulse = fac1 * (rij[k] * fac2 - aij[k] * r2);
                dv_out[i][k] = dv_out[i][k] + impulse * mj_d;
                dv_out[j][k] = dv_out[j][k] - impulse * mi_d;
            }
        }
    }
}

/// Applies one corrector (spec `# 4.8`) to `state`/`derivs`: accumulates
/// velocity impulses (compensated), `dadq`, `jac_phi`, and `dqdt_phi`.
/// Called once per corrector kind by `step::step`; the two calls accumulate
/// into the same `derivs.jac_phi`/`derivs.dqdt_phi` (cleared once per step,
/// not per corrector), matching spec `# 4.9`'s "Phi_c(h) + Phi_alpha(h,
/// alpha=2)" composition.
pub fn phi(state: &mut State, derivs: &mut Derivatives, pair: &[bool], h: f64, g_const: f64, kind: PhiKind) {
    let n = state.n;

    compute_accelerations(state, pair, g_const, kind);
    build_dadq(state, pair, g_const, kind, derivs);

    physical_delta_v(state, pair, g_const, h, kind, &mut derivs.phi_dv_f64);
    for i in 0..n {
        for k in 0..3 {
            let idx = 3 * i + k;
            csum_into(&mut state.v[idx], &mut state.verror[idx], derivs.phi_dv_f64[i][k]);
            let row = BLOCK * i + 3 + k;
            derivs.dqdt_phi[row] += (3.0 / h) * derivs.phi_dv_f64[i][k];
        }
    }

    // jac_phi: one dual column per (body, position-axis-or-mass) parameter,
    // seeded from the already-computed `dadq` tensor.
    for j in 0..n {
        for p in 0..4 {
            delta_v_column(state, &derivs.dadq, pair, g_const, h, kind, j, p, &mut derivs.phi_dv_dual);
            let col = BLOCK * j + if p < 3 { p } else { 6 };
            for i in 0..n {
                for k in 0..3 {
                    let row = BLOCK * i + 3 + k;
                    derivs.jac_phi[(row, col)] += derivs.phi_dv_dual[i][k].d;
                }
            }
        }
    }
}

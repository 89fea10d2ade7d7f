//! AH18 step orchestrator (spec `# 4.9`): composes drift, kick, the per-pair
//! Kepler-drift operator, and the Phi correctors into the symmetric
//! Drift-Kick-(KeplerDrift)-Phi-(KeplerDrift)-Kick-Drift split, folding each
//! local Jacobian into `state.jac_step` and propagating `state.dqdt`.
//!
//! ```text
//! Drift(h/2) -> Kick(h/6) -> [i<j: KeplerDrift_ij(h/2) if !pair[i,j]]
//!            -> Phi_c(h) + Phi_alpha(h, alpha=2)
//!            -> [i>j reversed: KeplerDrift_ij(h/2) if !pair[i,j]]
//!            -> Kick(h/6) -> Drift(h/2)
//! ```
//!
//! The reversed pair ordering in the second half pair loop is what makes
//! the composition time-symmetric (spec `# 2`).

use nalgebra::DMatrix;

use crate::compensated::csum_into;
use crate::derivatives::{Derivatives, PAIR_DIM};
use crate::drift::{drift, drift_position_only};
use crate::kepler::{assemble_pair, compute_jacobian_gamma, jac_delxv_gamma};
use crate::kick::kick;
use crate::phi::{phi, PhiKind};
use crate::state::{State, BLOCK};

/// Which accumulators a `step` call maintains. The physical `(x, v)` update
/// is identical in every mode; only the bookkeeping differs (spec `# 6`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StepMode {
    /// Only `x`, `v`, and their compensated-sum companions. Skips every
    /// `jac_step`/`dqdt` fold, so it skips the expensive `7n x 7n` matrix
    /// multiplies entirely (the per-pair Kepler Jacobian is not even
    /// computed). The cheapest variant.
    NoGradient,
    /// `x`, `v`, and `jac_step`, but no `dqdt` accounting.
    JacobianOnly,
    /// `x`, `v`, `jac_step`, and `dqdt`. The authoritative variant: every
    /// other mode is a strict subset of this one's bookkeeping.
    #[default]
    Full,
}

/// Advances `state` by one AH18 step of size `h`, consuming/producing
/// scratch through `derivs`, selecting per pair between the fast-kick and
/// Kepler-drift branches via `pair[n,n]` (row-major, symmetric; spec `# 6`).
/// `g_const` is the gravitational constant in the caller's unit system.
pub fn step(state: &mut State, derivs: &mut Derivatives, h: f64, pair: &[bool], g_const: f64, mode: StepMode) {
    derivs.clear();
    let n = state.n;
    debug_assert_eq!(pair.len(), n * n);

    let h2 = h / 2.0;
    let h6 = h / 6.0;

    let ascending_pairs: Vec<(usize, usize)> = (0..n).flat_map(|i| ((i + 1)..n).map(move |j| (i, j))).collect();

    // --- Drift(h/2), with dqdt seeded in "=" form on the first call. ---
    run_drift(state, derivs, h2, mode, DqdtSeedMode::Reset);

    // --- Kick(h/6) ---
    kick(state, derivs, pair, h6, g_const);
    fold_full_operator(state, derivs, mode, OperatorBuffer::Kick);

    // --- Ascending Kepler-drift pairs, drift_first = true ---
    for &(i, j) in &ascending_pairs {
        if pair[i * n + j] {
            log::trace!("pair ({i},{j}): fast kick (handled by Kick, not Kepler-drift)");
            continue;
        }
        log::trace!("pair ({i},{j}): kepler-drift, drift_first=true");
        apply_kepler_pair(state, derivs, i, j, h2, g_const, true, mode);
    }

    // --- Phi_c(h) + Phi_alpha(h, alpha=2) ---
    derivs.jac_phi.fill(0.0);
    derivs.dqdt_phi.fill(0.0);
    phi(state, derivs, pair, h, g_const, PhiKind::Corrector);
    phi(state, derivs, pair, h, g_const, PhiKind::Alpha);
    fold_full_operator(state, derivs, mode, OperatorBuffer::Phi);

    // --- Descending Kepler-drift pairs (reversed order), drift_first = false ---
    for &(i, j) in ascending_pairs.iter().rev() {
        if pair[i * n + j] {
            continue;
        }
        log::trace!("pair ({i},{j}): kepler-drift, drift_first=false");
        apply_kepler_pair(state, derivs, i, j, h2, g_const, false, mode);
    }

    // --- Second Kick(h/6) ---
    derivs.jac_kick.fill(0.0);
    derivs.dqdt_kick.fill(0.0);
    kick(state, derivs, pair, h6, g_const);
    fold_full_operator(state, derivs, mode, OperatorBuffer::Kick);

    // --- Second Drift(h/2), with dqdt seeded in "+=" form. ---
    run_drift(state, derivs, h2, mode, DqdtSeedMode::Accumulate);
}

/// Convenience entry point for the `# 6` "dqdt-only" variant. Per spec `# 9`
/// ("Open question"), the original source's dqdt-only recursion is an
/// acknowledged, unresolved inconsistency; this crate's documented
/// resolution (DESIGN.md) is to treat the Jacobian-propagating step as the
/// sole authoritative source of `dqdt` and simply run it in full, keeping
/// `jac_step` as a byproduct the caller may ignore. Kept as its own named
/// entry point for API parity with the three variants spec `# 6` lists, not
/// because it does anything [`StepMode::Full`] does not.
pub fn step_dqdt_experimental(state: &mut State, derivs: &mut Derivatives, h: f64, pair: &[bool], g_const: f64) {
    step(state, derivs, h, pair, g_const, StepMode::Full);
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DqdtSeedMode {
    Reset,
    Accumulate,
}

fn run_drift(state: &mut State, derivs: &Derivatives, h2: f64, mode: StepMode, seed: DqdtSeedMode) {
    if mode == StepMode::NoGradient {
        drift_position_only(state, h2);
        return;
    }
    drift(state, h2);
    if mode != StepMode::Full {
        return;
    }
    let n = state.n;
    for i in 0..n {
        let base = BLOCK * i;
        for k in 0..3 {
            let pos_row = base + k;
            let vel_row = base + 3 + k;
            let delta = 0.5 * state.v[3 * i + k] + h2 * state.dqdt[vel_row];
            if seed == DqdtSeedMode::Reset {
                state.dqdt[pos_row] = 0.0;
                state.dqdt_error[pos_row] = 0.0;
            }
            csum_into(&mut state.dqdt[pos_row], &mut state.dqdt_error[pos_row], delta);
        }
    }
    let _ = derivs;
}

#[derive(Clone, Copy)]
enum OperatorBuffer {
    Kick,
    Phi,
}

/// Folds a freshly-computed local, identity-free operator Jacobian
/// (`jac_kick` or `jac_phi`) into `state.jac_step` via
/// `jac_step <- (I + local) * jac_step`, and its `dqdt_*` companion into
/// `state.dqdt` via `dqdt <- dqdt_local + (I + local) * dqdt`, both with
/// compensated summation (spec `# 9`: "deep mutable scratch with global
/// identity"). `derivs.jac_copy` is reused as the input-then-output buffer
/// across the two multiplies the fold needs (spec `# 9`: "submatrix
/// view-and-fold" generalizes to the full-matrix case here too).
fn fold_full_operator(state: &mut State, derivs: &mut Derivatives, mode: StepMode, which: OperatorBuffer) {
    if mode == StepMode::NoGradient {
        return;
    }
    let dim = state.dim();
    let (local, dqdt_local): (&DMatrix<f64>, &nalgebra::DVector<f64>) = match which {
        OperatorBuffer::Kick => (&derivs.jac_kick, &derivs.dqdt_kick),
        OperatorBuffer::Phi => (&derivs.jac_phi, &derivs.dqdt_phi),
    };

    derivs.jac_copy.copy_from(&state.jac_step);
    local.mul_to(&derivs.jac_copy, &mut derivs.jac_tmp_full);
    local.mul_to(&state.jac_error, &mut derivs.jac_copy);
    for idx in 0..dim * dim {
        let main = derivs.jac_tmp_full[idx];
        let correction = derivs.jac_copy[idx];
        let mut y = main;
        let mut e = 0.0;
        csum_into(&mut y, &mut e, correction);
        state.jac_step[idx] = y;
        state.jac_error[idx] = e;
    }

    if mode == StepMode::Full {
        local.mul_to(&state.dqdt, &mut derivs.tmp7n);
        for idx in 0..dim {
            let delta = dqdt_local[idx] + derivs.tmp7n[idx];
            csum_into(&mut state.dqdt[idx], &mut state.dqdt_error[idx], delta);
        }
    }
}

/// One pair's Kepler-drift update (spec `# 4.5`): solve the relative
/// increment, apply the absolute position/velocity update, and (outside
/// [`StepMode::NoGradient`]) fold `jac_ij`/`dqdt_ij` into the 14 affected
/// rows of `jac_step`/`dqdt`.
#[allow(clippy::too_many_arguments)]
fn apply_kepler_pair(
    state: &mut State,
    derivs: &mut Derivatives,
    i: usize,
    j: usize,
    h2: f64,
    g_const: f64,
    drift_first: bool,
    mode: StepMode,
) {
    let mi = state.m[i];
    let mj = state.m[j];
    let k = g_const * (mi + mj);

    let mut x0 = [0.0; 3];
    let mut v0 = [0.0; 3];
    for a in 0..3 {
        x0[a] = state.x[3 * i + a] - state.x[3 * j + a];
        v0[a] = state.v[3 * i + a] - state.v[3 * j + a];
    }

    let kd = jac_delxv_gamma(x0, v0, k, h2, drift_first);

    if mode == StepMode::NoGradient {
        let update = crate::kepler::pair::absolute_update(kd.delxv, mi, mj);
        apply_absolute_update(state, i, j, &update);
        return;
    }

    let jac_mass = compute_jacobian_gamma(x0, v0, k, h2, drift_first, &kd.solution, &mut derivs.jac_kepler);
    derivs.jac_mass = jac_mass;

    let (update, dqdt_ij) = assemble_pair(
        kd.delxv,
        &derivs.jac_kepler,
        jac_mass,
        mi,
        mj,
        g_const,
        &mut derivs.jac_ij,
    );
    derivs.dqdt_ij = dqdt_ij;

    apply_absolute_update(state, i, j, &update);
    fold_pair_jacobian(state, derivs, i, j);
    if mode == StepMode::Full {
        fold_pair_dqdt(state, derivs, i, j);
    }
}

fn apply_absolute_update(state: &mut State, i: usize, j: usize, update: &crate::kepler::pair::PairUpdate) {
    for a in 0..3 {
        let idx_i = 3 * i + a;
        let idx_j = 3 * j + a;
        csum_into(&mut state.x[idx_i], &mut state.xerror[idx_i], update.dxi[a]);
        csum_into(&mut state.x[idx_j], &mut state.xerror[idx_j], update.dxj[a]);
        csum_into(&mut state.v[idx_i], &mut state.verror[idx_i], update.dvi[a]);
        csum_into(&mut state.v[idx_j], &mut state.verror[idx_j], update.dvj[a]);
    }
}

/// The 14 global rows this pair's `jac_ij` touches: body `i`'s 7-wide block
/// followed by body `j`'s.
fn pair_rows(state: &State, i: usize, j: usize) -> [usize; PAIR_DIM] {
    let mut rows = [0usize; PAIR_DIM];
    let bi = state.block_offset(i);
    let bj = state.block_offset(j);
    for r in 0..BLOCK {
        rows[r] = bi + r;
        rows[BLOCK + r] = bj + r;
    }
    rows
}

/// Submatrix view-and-fold (spec `# 9`): copy the 14 rows `jac_ij` touches
/// out of `jac_step`/`jac_error` into `jac_tmp1`/`jac_err1`, left-multiply
/// by `jac_ij` (which already carries its own identity, spec `# 4.5`), and
/// fold the two products back into those rows with compensated sum.
fn fold_pair_jacobian(state: &mut State, derivs: &mut Derivatives, i: usize, j: usize) {
    let dim = state.dim();
    let rows = pair_rows(state, i, j);

    for (r, &row) in rows.iter().enumerate() {
        for c in 0..dim {
            derivs.jac_tmp1[(r, c)] = state.jac_step[(row, c)];
            derivs.jac_err1[(r, c)] = state.jac_error[(row, c)];
        }
    }

    derivs.jac_ij.mul_to(&derivs.jac_tmp1, &mut derivs.jac_tmp2);
    // Reuse jac_tmp1 as the output buffer for the error-residual product;
    // its value copy has already been consumed by the multiply above.
    derivs.jac_ij.mul_to(&derivs.jac_err1, &mut derivs.jac_tmp1);

    for (r, &row) in rows.iter().enumerate() {
        for c in 0..dim {
            let main = derivs.jac_tmp2[(r, c)];
            let corr = derivs.jac_tmp1[(r, c)];
            let mut y = main;
            let mut e = 0.0;
            csum_into(&mut y, &mut e, corr);
            state.jac_step[(row, c)] = y;
            state.jac_error[(row, c)] = e;
        }
    }
}

/// Folds `dqdt_ij` (weighted by 1/2 per spec `# 4.9` step 3) and `jac_ij *
/// dqdt_prev` into the 14 rows of `state.dqdt` this pair touches.
fn fold_pair_dqdt(state: &mut State, derivs: &mut Derivatives, i: usize, j: usize) {
    let rows = pair_rows(state, i, j);
    for (r, &row) in rows.iter().enumerate() {
        derivs.dqdt_tmp1[r] = state.dqdt[row];
    }
    for r in 0..PAIR_DIM {
        let mut acc = 0.0;
        for c in 0..PAIR_DIM {
            acc += derivs.jac_ij[(r, c)] * derivs.dqdt_tmp1[c];
        }
        derivs.tmp14[r] = acc;
    }
    for (r, &row) in rows.iter().enumerate() {
        let delta = 0.5 * derivs.dqdt_ij[r] + derivs.tmp14[r];
        csum_into(&mut state.dqdt[row], &mut state.dqdt_error[row], delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_body() -> (State, Derivatives) {
        let s = State::new(
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            vec![1.0, 1e-3],
        )
        .unwrap();
        let d = Derivatives::new(2);
        (s, d)
    }

    #[test]
    fn mass_only_pair_matrix_dispatches_to_kick() {
        let (mut s, mut d) = two_body();
        let pair = [false, true, true, false];
        step(&mut s, &mut d, 0.01, &pair, 1.0, StepMode::Full);
        assert!(s.is_finite());
    }

    #[test]
    fn mass_rows_of_jac_step_stay_identity() {
        let (mut s, mut d) = two_body();
        let pair = [false, false, false, false];
        for _ in 0..5 {
            step(&mut s, &mut d, 0.02, &pair, 1.0, StepMode::Full);
        }
        for i in 0..s.n {
            let mass_row = BLOCK * i + 6;
            for c in 0..s.dim() {
                let expected = if c == mass_row { 1.0 } else { 0.0 };
                assert!(
                    (s.jac_step[(mass_row, c)] - expected).abs() < 1e-9,
                    "row {mass_row} col {c}: {}",
                    s.jac_step[(mass_row, c)]
                );
            }
        }
    }

    #[test]
    fn no_gradient_mode_leaves_jacobian_at_identity() {
        let (mut s, mut d) = two_body();
        let pair = [false, false, false, false];
        let before = s.jac_step.clone();
        step(&mut s, &mut d, 0.02, &pair, 1.0, StepMode::NoGradient);
        assert_eq!(s.jac_step, before);
        // Positions/velocities should still move.
        assert_ne!(s.x, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn jacobian_only_mode_leaves_dqdt_untouched() {
        let (mut s, mut d) = two_body();
        let pair = [false, false, false, false];
        step(&mut s, &mut d, 0.02, &pair, 1.0, StepMode::JacobianOnly);
        assert!(s.dqdt.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn all_zero_mass_step_is_a_pure_drift() {
        let mut s = State::new(
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            vec![0.1, 0.0, 0.0, 0.0, 0.2, 0.0],
            vec![0.0, 0.0],
        )
        .unwrap();
        let mut d = Derivatives::new(2);
        let pair = [false, false, false, false];
        let x0 = s.x.clone();
        let v0 = s.v.clone();
        step(&mut s, &mut d, 0.1, &pair, 1.0, StepMode::Full);
        for idx in 0..6 {
            assert!((s.x[idx] - (x0[idx] + 0.1 * v0[idx])).abs() < 1e-9);
            assert!((s.v[idx] - v0[idx]).abs() < 1e-12);
        }
    }

    #[test]
    fn pure_fast_kick_matches_leapfrog_reference() {
        // With every pair flagged for fast-kick, the Kepler/Phi branches
        // are never taken: the step should reduce to a symmetric
        // kick-drift-kick update (spec `# 8` property #6).
        let mut s = State::new(
            vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.5, 0.0],
            vec![1.0, 0.5],
        )
        .unwrap();
        let mut d = Derivatives::new(2);
        let pair = [false, true, true, false];
        let h = 0.01;
        step(&mut s, &mut d, h, &pair, 1.0, StepMode::NoGradient);

        // Reference: manual symmetric KDK with the same h/6+h/6 kick split
        // and h/2+h/2 drift split (Phi correctors vanish: every pair is
        // fast-kick, so Phi_alpha's complement set and Phi_c's... Phi_c
        // still runs over the fast-kick pairs, so reproduce that too).
        let mut r = State::new(
            vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.5, 0.0],
            vec![1.0, 0.5],
        )
        .unwrap();
        let mut rd = Derivatives::new(2);
        crate::drift::drift_position_only(&mut r, h / 2.0);
        kick(&mut r, &mut rd, &pair, h / 6.0, 1.0);
        phi(&mut r, &mut rd, &pair, h, 1.0, PhiKind::Corrector);
        phi(&mut r, &mut rd, &pair, h, 1.0, PhiKind::Alpha);
        kick(&mut r, &mut rd, &pair, h / 6.0, 1.0);
        crate::drift::drift_position_only(&mut r, h / 2.0);

        for idx in 0..6 {
            assert!((s.x[idx] - r.x[idx]).abs() < 1e-13);
            assert!((s.v[idx] - r.v[idx]).abs() < 1e-13);
        }
    }
}

//! Linear drift operator with Jacobian propagation (spec `# 4.6`).

use crate::compensated::csum_into;
use crate::state::{State, BLOCK};

/// Advances every body's position by `h*v` and folds `h` times the
/// velocity rows of `jac_step` into its position rows, both via
/// compensated sum. Velocity and mass rows/columns are untouched, matching
/// the fact that a pure drift does not alter velocities or masses.
pub fn drift(state: &mut State, h: f64) {
    let n = state.n;
    for i in 0..n {
        for k in 0..3 {
            let idx = 3 * i + k;
            let delta = h * state.v[idx];
            csum_into(&mut state.x[idx], &mut state.xerror[idx], delta);
        }
    }

    let dim = state.dim();
    for i in 0..n {
        let pos_base = BLOCK * i;
        for k in 0..3 {
            let row = pos_base + k;
            let vel_row = pos_base + 3 + k;
            for c in 0..dim {
                let delta = h * state.jac_step[(vel_row, c)];
                let mut y = state.jac_step[(row, c)];
                let mut e = state.jac_error[(row, c)];
                csum_into(&mut y, &mut e, delta);
                state.jac_step[(row, c)] = y;
                state.jac_error[(row, c)] = e;
            }
        }
    }
}

/// Position-only drift, skipping the `jac_step` row update entirely. Backs
/// the no-gradient `step` variant (spec `# 6`): cheaper because it skips
/// the `O(7n)`-per-body Jacobian row fold, not just because it discards the
/// result.
pub fn drift_position_only(state: &mut State, h: f64) {
    let n = state.n;
    for i in 0..n {
        for k in 0..3 {
            let idx = 3 * i + k;
            let delta = h * state.v[idx];
            csum_into(&mut state.x[idx], &mut state.xerror[idx], delta);
        }
    }
}

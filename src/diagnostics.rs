//! `show`/`StateReport` finite-check observer and `JacobianAudit`
//! finite-difference cross-check (spec `# 4.11`, `# 6`), grounded on the
//! teacher's `invariants::audit::NumericalAudit`.

use crate::derivatives::Derivatives;
use crate::state::State;
use crate::step::{step, StepMode};

/// The first non-finite value `show` found, if any, named by which array it
/// came from and its flat index within that array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NonFiniteLocation {
    Position(usize),
    Velocity(usize),
    JacobianStep(usize, usize),
    Dqdt(usize),
}

/// Result of [`show`]: whether `state` is entirely finite, and if not,
/// where the first offending value was found (array-major order: `x`,
/// `v`, `jac_step`, `dqdt`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateReport {
    pub finite: bool,
    pub first_non_finite: Option<NonFiniteLocation>,
}

/// Inspect `state` for the first non-finite value (spec `# 6`'s `show`
/// diagnostic), logging a `log::debug!` naming the offending array and
/// index per SPEC_FULL `# 7`. Does not mutate `state`; cheap enough to call
/// after every step during development, at the cost of an `O(7n + (7n)^2)`
/// scan.
pub fn show(state: &State) -> StateReport {
    for (idx, &v) in state.x.iter().enumerate() {
        if !v.is_finite() {
            log::debug!("show: non-finite value in x at index {idx}: {v}");
            return StateReport {
                finite: false,
                first_non_finite: Some(NonFiniteLocation::Position(idx)),
            };
        }
    }
    for (idx, &v) in state.v.iter().enumerate() {
        if !v.is_finite() {
            log::debug!("show: non-finite value in v at index {idx}: {v}");
            return StateReport {
                finite: false,
                first_non_finite: Some(NonFiniteLocation::Velocity(idx)),
            };
        }
    }
    let dim = state.dim();
    for r in 0..dim {
        for c in 0..dim {
            let v = state.jac_step[(r, c)];
            if !v.is_finite() {
                log::debug!("show: non-finite value in jac_step at ({r}, {c}): {v}");
                return StateReport {
                    finite: false,
                    first_non_finite: Some(NonFiniteLocation::JacobianStep(r, c)),
                };
            }
        }
    }
    for (idx, &v) in state.dqdt.iter().enumerate() {
        if !v.is_finite() {
            log::debug!("show: non-finite value in dqdt at index {idx}: {v}");
            return StateReport {
                finite: false,
                first_non_finite: Some(NonFiniteLocation::Dqdt(idx)),
            };
        }
    }
    StateReport {
        finite: true,
        first_non_finite: None,
    }
}

/// Finite-difference cross-check of `jac_step`/`dqdt` against perturbed
/// reruns of [`crate::step::step`], used by the property tests in `# 8`.
/// Mirrors the teacher's `NumericalAudit`: an analytic derivative
/// (`jac_step`'s columns) is checked against a numerical one (the change in
/// the post-step state under a small perturbation of one pre-step
/// coordinate), rather than trusted outright.
pub struct JacobianAudit {
    pub eps: f64,
}

impl JacobianAudit {
    pub fn new() -> Self {
        JacobianAudit { eps: 1e-6 }
    }

    /// Numerically estimate column `col` of `jac_step` by re-running `step`
    /// from two copies of `pre_step` with `packed[col]` perturbed by
    /// `+-eps`, where `packed` is the flattened `(x, v, m)` vector in
    /// `State::BLOCK` order, and central-differencing the resulting packed
    /// states.
    pub fn numerical_column(
        &self,
        pre_step: &State,
        derivs: &mut Derivatives,
        h: f64,
        pair: &[bool],
        g_const: f64,
        col: usize,
    ) -> Vec<f64> {
        let mut plus = pre_step.clone();
        let mut minus = pre_step.clone();
        perturb_packed(&mut plus, col, self.eps);
        perturb_packed(&mut minus, col, -self.eps);

        step(&mut plus, derivs, h, pair, g_const, StepMode::NoGradient);
        step(&mut minus, derivs, h, pair, g_const, StepMode::NoGradient);

        let dim = pre_step.dim();
        let mut out = vec![0.0; dim];
        for row in 0..dim {
            let a = packed_value(&plus, row);
            let b = packed_value(&minus, row);
            out[row] = (a - b) / (2.0 * self.eps);
        }
        out
    }

    /// Max relative error between `post_step.jac_step`'s column `col`
    /// (computed by the `step` call that produced `post_step` from
    /// `pre_step`) and this audit's numerical estimate of the same column,
    /// mirroring the teacher's `max_relative_error`.
    #[allow(clippy::too_many_arguments)]
    pub fn max_relative_error_for_column(
        &self,
        post_step: &State,
        derivs: &mut Derivatives,
        h: f64,
        pair: &[bool],
        g_const: f64,
        col: usize,
        pre_step: &State,
    ) -> f64 {
        let numerical = self.numerical_column(pre_step, derivs, h, pair, g_const, col);
        let dim = post_step.dim();
        let mut max_err = 0.0f64;
        for row in 0..dim {
            let analytic = post_step.jac_step[(row, col)];
            let num = numerical[row];
            let err = if num.abs() > 1e-12 {
                ((analytic - num) / num).abs()
            } else {
                (analytic - num).abs()
            };
            max_err = max_err.max(err);
        }
        max_err
    }
}

impl Default for JacobianAudit {
    fn default() -> Self {
        Self::new()
    }
}

fn packed_value(state: &State, row: usize) -> f64 {
    let block = crate::state::BLOCK;
    let i = row / block;
    let offset = row % block;
    match offset {
        0..=2 => state.x[3 * i + offset],
        3..=5 => state.v[3 * i + (offset - 3)],
        _ => state.m[i],
    }
}

fn perturb_packed(state: &mut State, row: usize, delta: f64) {
    let block = crate::state::BLOCK;
    let i = row / block;
    let offset = row % block;
    match offset {
        0..=2 => state.x[3 * i + offset] += delta,
        3..=5 => state.v[3 * i + (offset - 3)] += delta,
        _ => state.m[i] += delta,
    }
}

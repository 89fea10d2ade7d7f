//! Deterministic run driver (spec `# 4.10`): turns repeated [`crate::step::step`]
//! calls into a bounded run between `t0` and `tmax`, mirroring the teacher's
//! `geodesic::integrate` (single-step primitive -> bounded run with a
//! termination report), but with no physics or I/O of its own.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::compensated::csum_into;
use crate::derivatives::Derivatives;
use crate::state::State;
use crate::step::{step, StepMode};

/// A multiple of `f64::EPSILON` used to decide whether the remainder
/// `tmax - (t0 + n*h)` is "non-zero" after `n` full steps of round-off
/// accumulation, rather than comparing against exact zero.
const REMAINDER_EPSILON_FACTOR: f64 = 64.0;

/// `t0`/`h`/`tmax` scheduling record for a single [`run`] call (spec `# 6`'s
/// `Integrator`). Deriving `Clone`/`Debug` always and, behind the teacher's
/// existing optional `serde` feature, `Serialize`/`Deserialize`, lets a
/// caller load a run's `t0, h, tmax` from whatever config format they
/// already use, matching the teacher's `gravitas-core` optional-`serde`
/// convention exactly (same feature name, same `dep:serde` gate).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Integrator {
    pub t0: f64,
    pub h: f64,
    pub tmax: f64,
    pub mode: StepMode,
}

impl Integrator {
    pub fn new(t0: f64, h: f64, tmax: f64) -> Self {
        Integrator {
            t0,
            h,
            tmax,
            mode: StepMode::Full,
        }
    }

    pub fn with_mode(mut self, mode: StepMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Outcome of a [`run`] call: how many full steps were taken and whether a
/// trailing partial step closed the remaining gap to `tmax`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    pub full_steps: usize,
    pub partial_step: Option<f64>,
}

/// Advances `state` from `integrator.t0` to `integrator.tmax` by repeated
/// calls to [`crate::step::step`]: `floor((tmax - t0) / h)` steps of size
/// `h`, then one partial step of size `tmax - (t0 + n*h)` if that remainder
/// exceeds `REMAINDER_EPSILON_FACTOR * f64::EPSILON * tmax.abs().max(1.0)`
/// (spec `# 4.10`). `state.t`/`state.t_error` are advanced via compensated
/// sum alongside every step, so the scheduler's own bookkeeping does not
/// introduce drift beyond what `step` itself contributes.
///
/// This is a direct transliteration of the loop spec.md already specifies
/// in prose; it owns no physics, does no I/O, and is not the hierarchical-
/// coordinates/timing/profiling driver spec.md's Non-goals exclude.
pub fn run(state: &mut State, derivs: &mut Derivatives, pair: &[bool], g_const: f64, integrator: &Integrator) -> RunReport {
    let Integrator { t0, h, tmax, mode } = *integrator;
    debug_assert!(h > 0.0, "scheduler requires a positive step size");

    state.t = t0;
    state.t_error = 0.0;

    let span = tmax - t0;
    let full_steps = (span / h).floor().max(0.0) as usize;

    for _ in 0..full_steps {
        step(state, derivs, h, pair, g_const, mode);
        csum_into(&mut state.t, &mut state.t_error, h);
    }

    let remainder = tmax - state.t;
    let tolerance = REMAINDER_EPSILON_FACTOR * f64::EPSILON * tmax.abs().max(1.0);
    let partial_step = if remainder.abs() > tolerance {
        step(state, derivs, remainder, pair, g_const, mode);
        csum_into(&mut state.t, &mut state.t_error, remainder);
        Some(remainder)
    } else {
        None
    };

    RunReport {
        full_steps,
        partial_step,
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
    fn run_takes_exact_number_of_full_steps_with_no_remainder() {
        let (mut s, mut d) = two_body();
        let pair = [false, false, false, false];
        let integrator = Integrator::new(0.0, 0.1, 1.0);
        let report = run(&mut s, &mut d, &pair, 1.0, &integrator);
        assert_eq!(report.full_steps, 10);
        assert_eq!(report.partial_step, None);
        assert!((s.t - 1.0).abs() < 1e-9);
    }

    #[test]
    fn run_takes_a_trailing_partial_step_when_tmax_is_not_a_multiple_of_h() {
        let (mut s, mut d) = two_body();
        let pair = [false, false, false, false];
        let integrator = Integrator::new(0.0, 0.3, 1.0);
        let report = run(&mut s, &mut d, &pair, 1.0, &integrator);
        assert_eq!(report.full_steps, 3);
        let partial = report.partial_step.expect("expected a trailing partial step");
        assert!((partial - 0.1).abs() < 1e-9);
        assert!((s.t - 1.0).abs() < 1e-9);
    }

    #[test]
    fn run_respects_the_requested_step_mode() {
        let (mut s, mut d) = two_body();
        let pair = [false, false, false, false];
        let integrator = Integrator::new(0.0, 0.2, 0.6).with_mode(StepMode::NoGradient);
        let before = s.jac_step.clone();
        run(&mut s, &mut d, &pair, 1.0, &integrator);
        assert_eq!(s.jac_step, before);
    }
}

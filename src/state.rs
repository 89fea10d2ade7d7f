//! The mutable phase-space state an AH18 [`crate::step::step`] advances in
//! place, per spec `# 3`.

use nalgebra::{DMatrix, DVector};

use crate::error::StateError;

/// Packed-vector width per body: 3 position + 3 velocity + 1 mass.
pub const BLOCK: usize = 7;

/// `State` owns the caller's phase-space vector, the accumulated Jacobian
/// and `dqdt` of that vector with respect to its value at integration
/// start, the compensated-summation residual companions for every
/// accumulator, and a handful of scratch buffers reused across steps so
/// that no step allocates.
///
/// Construction is the crate's only fallible public entry point
/// ([`State::new`]); once built, `step` mutates a `State` in place and
/// never fails (spec `# 7`: "no recovery inside a step").
#[derive(Debug, Clone)]
pub struct State {
    pub n: usize,

    /// Flattened `[3, n]` positions, body-major (`x[3*i + k]`).
    pub x: Vec<f64>,
    /// Flattened `[3, n]` velocities, same layout as `x`.
    pub v: Vec<f64>,
    /// Per-body masses, constant through integration.
    pub m: Vec<f64>,
    /// Current integration time.
    pub t: f64,
    /// Compensated-summation residual for `t`, folded by the scheduler.
    pub t_error: f64,

    /// Accumulated Jacobian of the packed `(x,v,m)` vector with respect to
    /// its value at step-start. Initially the identity.
    pub jac_step: DMatrix<f64>,
    /// Change-of-basis from user coordinates; opaque to the core (spec
    /// `# 3`). Defaults to identity when no external `init_nbody` result is
    /// supplied.
    pub jac_init: DMatrix<f64>,
    /// Current `d(packed state)/dt`.
    pub dqdt: DVector<f64>,

    pub xerror: Vec<f64>,
    pub verror: Vec<f64>,
    pub jac_error: DMatrix<f64>,
    pub dqdt_error: DVector<f64>,

    // Scratch slot owned by State to avoid per-step allocation: per-body
    // acceleration, filled by `phi::compute_accelerations` and consumed
    // directly by the Phi correctors' physical velocity update (spec `# 3`).
    // Contents are undefined between operations.
    pub a: Vec<f64>,
}

impl State {
    /// Validates the cheaply-checkable preconditions SPEC_FULL.md `# 3`
    /// lists (body count, slice-length consistency, non-finite masses) and
    /// builds a fresh `State` with `jac_step`/`jac_init` at identity and
    /// all other accumulators zeroed.
    ///
    /// Misuse discovered only mid-step (an asymmetric `pair` matrix, a
    /// negative mass) remains undefined behavior per spec `# 7`; this
    /// constructor does not attempt to catch it.
    pub fn new(x: Vec<f64>, v: Vec<f64>, m: Vec<f64>) -> Result<Self, StateError> {
        let n = m.len();
        if n < 2 {
            return Err(StateError::TooFewBodies { n });
        }
        if x.len() != 3 * n {
            return Err(StateError::PositionLengthMismatch {
                expected: 3 * n,
                got: x.len(),
            });
        }
        if v.len() != 3 * n {
            return Err(StateError::VelocityLengthMismatch {
                expected: 3 * n,
                got: v.len(),
            });
        }
        for (index, &value) in m.iter().enumerate() {
            if !value.is_finite() {
                return Err(StateError::NonFiniteMass { index, value });
            }
        }

        let dim = BLOCK * n;
        Ok(State {
            n,
            x,
            v,
            m,
            t: 0.0,
            t_error: 0.0,
            jac_step: DMatrix::identity(dim, dim),
            jac_init: DMatrix::identity(dim, dim),
            dqdt: DVector::zeros(dim),
            xerror: vec![0.0; 3 * n],
            verror: vec![0.0; 3 * n],
            jac_error: DMatrix::zeros(dim, dim),
            dqdt_error: DVector::zeros(dim),
            a: vec![0.0; 3 * n],
        })
    }

    /// Packed-vector width `7n`.
    pub fn dim(&self) -> usize {
        BLOCK * self.n
    }

    /// Row/column offset into `jac_step`/`dqdt` for body `i`'s position
    /// block. Velocity occupies `offset+3..offset+6`, mass `offset+6`.
    #[inline]
    pub fn block_offset(&self, i: usize) -> usize {
        BLOCK * i
    }

    /// `true` if every position, velocity, and Jacobian entry is finite.
    /// Backs the `# 6` `show(State)` diagnostic observer.
    pub fn is_finite(&self) -> bool {
        self.x.iter().all(|v| v.is_finite())
            && self.v.iter().all(|v| v.is_finite())
            && self.jac_step.iter().all(|v| v.is_finite())
            && self.dqdt.iter().all(|v| v.is_finite())
    }
}

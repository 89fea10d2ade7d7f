//! # ah18 -- symplectic N-body integration with propagated gradients
//!
//! A 4th-order, time-reversible Drift-Kick-Kepler-Phi ("AH18") integrator for
//! gravitational N-body systems, propagating not just phase space `(x, v, m)`
//! but its Jacobian with respect to the initial conditions (and, optionally,
//! `d/dt` of the packed state) alongside it. Built for long-term planetary
//! dynamics and transit-timing-variation studies, where both the trajectory
//! and its sensitivity to initial conditions are needed to high precision
//! over very long integrations.
//!
//! ## Quick start
//!
//! ```rust
//! use ah18::prelude::*;
//!
//! let mut state = State::new(
//!     vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
//!     vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
//!     vec![1.0, 1e-3],
//! ).unwrap();
//! let mut derivs = Derivatives::new(state.n);
//! let pair = vec![false; state.n * state.n];
//!
//! step(&mut state, &mut derivs, 0.01, &pair, 1.0, StepMode::Full);
//! assert!(state.is_finite());
//! ```
//!
//! ## Architecture
//!
//! - [`state`] -- the mutable phase-space [`State`] a step advances in place
//! - [`derivatives`] -- caller-owned scratch ([`Derivatives`]) reused across steps
//! - [`step`] -- the AH18 orchestrator: composes drift, kick, Kepler-drift, and Phi
//! - [`drift`] -- the linear drift operator
//! - [`kick`] -- the pairwise fast-kick (`1/r^3`) operator
//! - [`kepler`] -- the per-pair Kepler-drift solve and its Jacobian
//! - [`phi`] -- the Phi_c/Phi_alpha correctors
//! - [`stumpff`] -- Stumpff/G-function and H-function universal-variable helpers
//! - [`compensated`] -- Kahan compensated-summation primitives
//! - [`scheduler`] -- a thin, deterministic `t0..tmax` run driver
//! - [`diagnostics`] -- the `show`/`StateReport` finite-value observer and `JacobianAudit`
//! - [`error`] -- construction-time validation failures
//! - [`constants`] -- the one fixed constant this crate defines (`NDIM`)

pub mod compensated;
pub mod constants;
pub mod derivatives;
pub mod diagnostics;
pub mod drift;
pub mod error;
pub mod kepler;
pub mod kick;
pub mod phi;
pub mod scheduler;
pub mod state;
pub mod step;
pub mod stumpff;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::derivatives::Derivatives;
    pub use crate::diagnostics::{show, JacobianAudit, StateReport};
    pub use crate::error::StateError;
    pub use crate::scheduler::{Integrator, RunReport};
    pub use crate::state::State;
    pub use crate::step::{step, StepMode};
}

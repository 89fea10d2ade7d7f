//! Error kinds returned by this crate's one fallible entry point,
//! `State::new`. `step` itself returns `()` (spec `# 6`): once a `State` is
//! constructed, a step either completes or its damage is only observable
//! after the fact through [`crate::diagnostics::show`].

use thiserror::Error;

/// Construction-time validation failures for [`crate::state::State`].
///
/// These cover exactly the "cheaply checkable" preconditions
/// SPEC_FULL.md `# 3` lists: body count, slice-length consistency, and
/// non-finite masses. Misuse discovered mid-step (an asymmetric `pair`
/// matrix, a negative mass) remains a contract violation per spec `# 7` and
/// is not represented here.
#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("at least 2 bodies are required, got {n}")]
    TooFewBodies { n: usize },

    #[error("expected {expected} position components (3*n), got {got}")]
    PositionLengthMismatch { expected: usize, got: usize },

    #[error("expected {expected} velocity components (3*n), got {got}")]
    VelocityLengthMismatch { expected: usize, got: usize },

    #[error("expected {expected} masses, got {got}")]
    MassLengthMismatch { expected: usize, got: usize },

    #[error("mass at index {index} is not finite: {value}")]
    NonFiniteMass { index: usize, value: f64 },
}

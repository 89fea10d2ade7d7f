//! The one fixed constant this crate defines (spec `# 6`).
//!
//! The gravitational constant is deliberately not fixed here: every public
//! entry point (`step`, `kick`, the Kepler-drift pair operator, `phi`,
//! `scheduler::run`) takes `g_const` as a caller-supplied parameter, since
//! the unit system (SI, geometric, or any caller convention) is a property
//! of the integration, not of this crate.

/// Spatial dimensionality every body's position/velocity is packed in.
pub const NDIM: usize = 3;

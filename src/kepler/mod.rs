//! Universal-variable Kepler solver, its analytic Jacobian, and the
//! per-pair operator built on top of them (spec `# 4.3`-`# 4.5`).

pub mod dual;
pub mod gamma;
pub mod jacobian;
pub mod pair;

pub use gamma::{jac_delxv_gamma, solve_gamma, GammaSolution, KeplerDrift};
pub use jacobian::compute_jacobian_gamma;
pub use pair::{absolute_update, assemble_pair, PairUpdate};

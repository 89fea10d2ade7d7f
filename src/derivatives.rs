//! Caller-owned scratch for one [`crate::step::step`] call, per spec `# 3`.
//! Allocated once per integration run and reused; contents between calls are
//! undefined.

use nalgebra::{DMatrix, DVector};

use crate::kepler::dual::Dual;
use crate::state::BLOCK;

/// One pair's local Jacobian is `14x14` (two bodies x 7-wide block each).
pub const PAIR_DIM: usize = 2 * BLOCK;

/// Index into the flattened `dadq[3,n,4,n]` tensor, usable without
/// borrowing the whole [`Derivatives`] struct (the Phi correctors need this
/// alongside a disjoint mutable borrow of another scratch field).
#[inline]
pub fn dadq_index(n: usize, k: usize, i: usize, p: usize, j: usize) -> usize {
    ((k * n + i) * 4 + p) * n + j
}

#[derive(Debug, Clone)]
pub struct Derivatives {
    pub n: usize,

    /// Local Jacobians for the kick and phi operators, stored without the
    /// identity — the orchestrator adds it implicitly via the compensated
    /// `(I + jac_*) * jac_step` fold.
    pub jac_kick: DMatrix<f64>,
    pub jac_phi: DMatrix<f64>,

    /// Local Jacobian for one pair's Kepler-drift operation.
    pub jac_ij: DMatrix<f64>,

    // Matrix-multiply scratch: copy the 14 rows of jac_step a pair touches
    // into jac_tmp1, left-multiply by jac_ij into jac_tmp2, fold back with
    // compensated sum using jac_err1 as the residual companion.
    pub jac_copy: DMatrix<f64>,
    pub jac_tmp1: DMatrix<f64>,
    pub jac_tmp2: DMatrix<f64>,
    pub jac_err1: DMatrix<f64>,

    /// Full `7n x 7n` scratch for the kick/phi Jacobian fold's matrix
    /// product (`jac_kick`/`jac_phi` times the current `jac_step` or
    /// `jac_error`), kept separate from `jac_copy` so the two can serve as
    /// each other's distinct output buffer across the fold's two
    /// multiplies without aliasing (spec `# 9` "deep mutable scratch").
    pub jac_tmp_full: DMatrix<f64>,

    /// Outputs of `kepler::jacobian::compute_jacobian_gamma`: 6x8 Jacobian
    /// of Delta(x,v) w.r.t. (x0,v0,k,h), and the separately-derived
    /// mass-column 6-vector (spec `# 4.4`, `# 9` "mass column precision
    /// trick").
    pub jac_kepler: DMatrix<f64>,
    pub jac_mass: [f64; 6],

    pub dqdt_kick: DVector<f64>,
    pub dqdt_phi: DVector<f64>,
    pub dqdt_ij: [f64; PAIR_DIM],
    pub dqdt_tmp1: [f64; PAIR_DIM],
    pub tmp7n: DVector<f64>,
    pub tmp14: [f64; PAIR_DIM],

    /// Dense tensor of `d(a_i,k)/d(pos_j,p or mass_j)` used by the Phi
    /// correctors, flattened as `[k,i,p,j]` row-major with `p in 0..4`
    /// (0..3 = position axes, 3 = mass).
    pub dadq: Vec<f64>,

    /// Per-body velocity-impulse scratch for `phi::phi`'s physical update
    /// pass (plain `f64`, sized `n`).
    pub phi_dv_f64: Vec<[f64; 3]>,
    /// Per-body velocity-impulse scratch for `phi::phi`'s `jac_phi` column
    /// pass (forward-mode dual, sized `n`, reused across all `4n` columns).
    pub phi_dv_dual: Vec<[Dual; 3]>,
}

impl Derivatives {
    pub fn new(n: usize) -> Self {
        let dim = BLOCK * n;
        Derivatives {
            n,
            jac_kick: DMatrix::zeros(dim, dim),
            jac_phi: DMatrix::zeros(dim, dim),
            jac_ij: DMatrix::zeros(PAIR_DIM, PAIR_DIM),
            jac_copy: DMatrix::zeros(dim, dim),
            jac_tmp1: DMatrix::zeros(PAIR_DIM, dim),
            jac_tmp2: DMatrix::zeros(PAIR_DIM, dim),
            jac_err1: DMatrix::zeros(PAIR_DIM, dim),
            jac_tmp_full: DMatrix::zeros(dim, dim),
            jac_kepler: DMatrix::zeros(6, 8),
            jac_mass: [0.0; 6],
            dqdt_kick: DVector::zeros(dim),
            dqdt_phi: DVector::zeros(dim),
            dqdt_ij: [0.0; PAIR_DIM],
            dqdt_tmp1: [0.0; PAIR_DIM],
            tmp7n: DVector::zeros(dim),
            tmp14: [0.0; PAIR_DIM],
            dadq: vec![0.0; 3 * n * 4 * n],
            phi_dv_f64: vec![[0.0; 3]; n],
            phi_dv_dual: vec![[Dual::c(0.0); 3]; n],
        }
    }

    /// Index into the flattened `dadq[3,n,4,n]` tensor.
    #[inline]
    pub fn dadq_index(&self, k: usize, i: usize, p: usize, j: usize) -> usize {
        dadq_index(self.n, k, i, p, j)
    }

    /// Zero every scratch buffer. Called at the top of each `step` call
    /// (spec `# 4.9`: "after zeroing the derivatives scratch").
    pub fn clear(&mut self) {
        self.jac_kick.fill(0.0);
        self.jac_phi.fill(0.0);
        self.jac_ij.fill(0.0);
        self.jac_copy.fill(0.0);
        self.jac_tmp1.fill(0.0);
        self.jac_tmp2.fill(0.0);
        self.jac_err1.fill(0.0);
        self.jac_tmp_full.fill(0.0);
        self.jac_kepler.fill(0.0);
        self.jac_mass = [0.0; 6];
        self.dqdt_kick.fill(0.0);
        self.dqdt_phi.fill(0.0);
        self.dqdt_ij = [0.0; PAIR_DIM];
        self.dqdt_tmp1 = [0.0; PAIR_DIM];
        self.tmp7n.fill(0.0);
        self.tmp14 = [0.0; PAIR_DIM];
        self.dadq.iter_mut().for_each(|v| *v = 0.0);
        self.phi_dv_f64.iter_mut().for_each(|v| *v = [0.0; 3]);
        self.phi_dv_dual.iter_mut().for_each(|v| *v = [Dual::c(0.0); 3]);
    }
}

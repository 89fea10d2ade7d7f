//! Kepler-drift pair operator (spec `# 4.5`): turns a relative Delta(x,v)
//! and its Jacobian into absolute updates on two bodies with mass-weighted
//! splits, and assembles the `14x14` local Jacobian `jac_ij` and the
//! 14-vector `dqdt_ij`.

use nalgebra::DMatrix;

/// Absolute-coordinate increment for one pair, ready to be folded into
/// `State::x`/`State::v` via compensated sum by the caller.
#[derive(Debug, Clone, Copy)]
pub struct PairUpdate {
    pub dxi: [f64; 3],
    pub dvi: [f64; 3],
    pub dxj: [f64; 3],
    pub dvj: [f64; 3],
}

/// Mass-weighted split of a relative increment `delxv` (spec `# 4.5`):
/// `mu_i = m_i/(m_i+m_j)`, `mu_j = m_j/(m_i+m_j)`,
/// `x_i += mu_j*Dx, x_j -= mu_i*Dx`, likewise for `v`.
pub fn absolute_update(delxv: [f64; 6], mi: f64, mj: f64) -> PairUpdate {
    let msum = mi + mj;
    let mu_i = mi / msum;
    let mu_j = mj / msum;
    let mut dxi = [0.0; 3];
    let mut dvi = [0.0; 3];
    let mut dxj = [0.0; 3];
    let mut dvj = [0.0; 3];
    for k in 0..3 {
        dxi[k] = mu_j * delxv[k];
        dxj[k] = -mu_i * delxv[k];
        dvi[k] = mu_j * delxv[3 + k];
        dvj[k] = -mu_i * delxv[3 + k];
    }
    PairUpdate { dxi, dvi, dxj, dvj }
}

/// Build the `14x14` local Jacobian `jac_ij` into `jac_out` (caller-owned
/// scratch — `Derivatives::jac_ij`) and return the 14-vector `dqdt_ij`,
/// given `jac_kepler[6,8]`, the separate `jac_mass[6]` (columns ordered
/// x0[0..3], v0[0..3], k, h; spec `# 4.4`/`# 9`), the reduced-mass
/// gravitational constant `g_const`, and the two body masses.
///
/// Block layout (rows = cols, both `0..14`): `0..3` position, `3..6`
/// velocity, `6` mass of body i; `7..10` position, `10..13` velocity, `13`
/// mass of body j. Relative coordinates are `x0 = x_i - x_j`,
/// `v0 = v_i - v_j`, so `d(x0)/d(x_i) = I`, `d(x0)/d(x_j) = -I`.
pub fn assemble_pair_jacobian(
    jac_kepler: &DMatrix<f64>,
    jac_mass: [f64; 6],
    mi: f64,
    mj: f64,
    g_const: f64,
    jac_out: &mut DMatrix<f64>,
) -> [f64; 14] {
    debug_assert_eq!(jac_out.shape(), (14, 14));

    let msum = mi + mj;
    let mu_i = mi / msum;
    let mu_j = mj / msum;

    let block = |r0: usize, c0: usize| -> [[f64; 3]; 3] {
        let mut m = [[0.0; 3]; 3];
        for r in 0..3 {
            for c in 0..3 {
                m[r][c] = jac_kepler[(r0 + r, c0 + c)];
            }
        }
        m
    };
    let jxx = block(0, 0); // d(Dx)/d(x0)
    let jxv = block(0, 3); // d(Dx)/d(v0)
    let jvx = block(3, 0); // d(Dv)/d(x0)
    let jvv = block(3, 3); // d(Dv)/d(v0)

    // jac_kepler's own k-column (index 6) is deliberately not used for mass
    // derivatives; see `kepler::jacobian`'s doc comment. `jac_mass` replaces it.
    let d_dx_dk = [jac_mass[0], jac_mass[1], jac_mass[2]];
    let d_dv_dk = [jac_mass[3], jac_mass[4], jac_mass[5]];
    // k = g_const*(m_i+m_j), so d(k)/dm_i = d(k)/dm_j = g_const.
    let d_dx_dm = [d_dx_dk[0] * g_const, d_dx_dk[1] * g_const, d_dx_dk[2] * g_const];
    let d_dv_dm = [d_dv_dk[0] * g_const, d_dv_dk[1] * g_const, d_dv_dk[2] * g_const];

    // This accounts for mu*d(Delta)/dm only; the product-rule term on mu's
    // own mass dependence (Delta*d(mu)/dm) is added by
    // `add_mu_product_rule`, since it needs `delxv`'s value directly.
    jac_out.fill(0.0);
    for r in 0..14 {
        jac_out[(r, r)] = 1.0;
    }

    // --- position/velocity rows for body i (x_i += mu_j*Dx, v_i += mu_j*Dv) ---
    for r in 0..3 {
        for c in 0..3 {
            jac_out[(r, c)] += mu_j * jxx[r][c]; // d(x_i)/d(x_i)
            jac_out[(r, 7 + c)] = -mu_j * jxx[r][c]; // d(x_i)/d(x_j)
            jac_out[(r, 3 + c)] = mu_j * jxv[r][c]; // d(x_i)/d(v_i)
            jac_out[(r, 10 + c)] = -mu_j * jxv[r][c]; // d(x_i)/d(v_j)

            jac_out[(3 + r, c)] = mu_j * jvx[r][c]; // d(v_i)/d(x_i)
            jac_out[(3 + r, 7 + c)] = -mu_j * jvx[r][c]; // d(v_i)/d(x_j)
            jac_out[(3 + r, 3 + c)] += mu_j * jvv[r][c]; // d(v_i)/d(v_i)
            jac_out[(3 + r, 10 + c)] = -mu_j * jvv[r][c]; // d(v_i)/d(v_j)
        }
        jac_out[(r, 6)] = mu_j * d_dx_dm[r]; // d(x_i)/d(m_i), mu*d(Delta)/dm term
        jac_out[(r, 13)] = mu_j * d_dx_dm[r];
        jac_out[(3 + r, 6)] = mu_j * d_dv_dm[r];
        jac_out[(3 + r, 13)] = mu_j * d_dv_dm[r];
    }

    // --- position/velocity rows for body j (x_j -= mu_i*Dx, v_j -= mu_i*Dv) ---
    for r in 0..3 {
        for c in 0..3 {
            jac_out[(7 + r, c)] = -mu_i * jxx[r][c]; // d(x_j)/d(x_i)
            jac_out[(7 + r, 7 + c)] += mu_i * jxx[r][c]; // d(x_j)/d(x_j)
            jac_out[(7 + r, 3 + c)] = -mu_i * jxv[r][c]; // d(x_j)/d(v_i)
            jac_out[(7 + r, 10 + c)] = mu_i * jxv[r][c]; // d(x_j)/d(v_j)

            jac_out[(10 + r, c)] = -mu_i * jvx[r][c]; // d(v_j)/d(x_i)
            jac_out[(10 + r, 7 + c)] = mu_i * jvx[r][c]; // d(v_j)/d(x_j)
            jac_out[(10 + r, 3 + c)] = -mu_i * jvv[r][c]; // d(v_j)/d(v_i)
            jac_out[(10 + r, 10 + c)] += mu_i * jvv[r][c]; // d(v_j)/d(v_j)
        }
        jac_out[(7 + r, 6)] = -mu_i * d_dx_dm[r];
        jac_out[(7 + r, 13)] = -mu_i * d_dx_dm[r];
        jac_out[(10 + r, 6)] = -mu_i * d_dv_dm[r];
        jac_out[(10 + r, 13)] = -mu_i * d_dv_dm[r];
    }

    // dqdt_ij read from the h-column of jac_kepler (spec `# 4.5`), split
    // with the same mu weighting as the spatial update.
    let d_dx_dh = [jac_kepler[(0, 7)], jac_kepler[(1, 7)], jac_kepler[(2, 7)]];
    let d_dv_dh = [jac_kepler[(3, 7)], jac_kepler[(4, 7)], jac_kepler[(5, 7)]];
    let mut dqdt_ij = [0.0; 14];
    for k in 0..3 {
        dqdt_ij[k] = mu_j * d_dx_dh[k];
        dqdt_ij[3 + k] = mu_j * d_dv_dh[k];
        dqdt_ij[7 + k] = -mu_i * d_dx_dh[k];
        dqdt_ij[10 + k] = -mu_i * d_dv_dh[k];
    }

    dqdt_ij
}

/// `mu`'s own mass-dependence term, `Delta * d(mu)/dm`, added on top of
/// [`assemble_pair_jacobian`]'s `mu * d(Delta)/dm` term to get the full
/// mass-column entries (spec `# 4.5`: "mass columns ... use jac_mass*m_other
/// ... to preserve precision").
pub fn add_mu_product_rule(jac: &mut DMatrix<f64>, delxv: [f64; 6], mi: f64, mj: f64) {
    let msum = mi + mj;
    let dmu_j_dmi = -mj / (msum * msum);
    let dmu_j_dmj = mi / (msum * msum);
    let dmu_i_dmi = mj / (msum * msum);
    let dmu_i_dmj = -mi / (msum * msum);

    for r in 0..3 {
        jac[(r, 6)] += delxv[r] * dmu_j_dmi;
        jac[(r, 13)] += delxv[r] * dmu_j_dmj;
        jac[(3 + r, 6)] += delxv[3 + r] * dmu_j_dmi;
        jac[(3 + r, 13)] += delxv[3 + r] * dmu_j_dmj;

        jac[(7 + r, 6)] += -delxv[r] * dmu_i_dmi;
        jac[(7 + r, 13)] += -delxv[r] * dmu_i_dmj;
        jac[(10 + r, 6)] += -delxv[3 + r] * dmu_i_dmi;
        jac[(10 + r, 13)] += -delxv[3 + r] * dmu_i_dmj;
    }
}

/// Full pair update: absolute `(x,v)` increments and `dqdt_ij`, writing the
/// `14x14` local Jacobian into `jac_out`. Combines [`absolute_update`],
/// [`assemble_pair_jacobian`], and [`add_mu_product_rule`].
#[allow(clippy::too_many_arguments)]
pub fn assemble_pair(
    delxv: [f64; 6],
    jac_kepler: &DMatrix<f64>,
    jac_mass: [f64; 6],
    mi: f64,
    mj: f64,
    g_const: f64,
    jac_out: &mut DMatrix<f64>,
) -> (PairUpdate, [f64; 14]) {
    let update = absolute_update(delxv, mi, mj);
    let dqdt_ij = assemble_pair_jacobian(jac_kepler, jac_mass, mi, mj, g_const, jac_out);
    add_mu_product_rule(jac_out, delxv, mi, mj);
    (update, dqdt_ij)
}

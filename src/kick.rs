//! Fast-kick operator (spec `# 4.7`): the pairwise `1/r^3` impulse applied
//! to every pair flagged `pair[i,j] = true`, i.e. pairs whose Keplerian
//! motion is not explicitly solved this step.

use crate::compensated::csum_into;
use crate::derivatives::Derivatives;
use crate::state::{State, BLOCK};

/// Applies the fast-kick impulse for every `pair[i,j] == true`, folding
/// velocity updates into `state.v`/`state.verror` and accumulating the
/// local Jacobian (without identity) and `dqdt` rate into `derivs`.
///
/// `h` is whatever sub-step this call represents (the orchestrator scales
/// by `h/6` per spec `# 4.9`); `g_const` is the gravitational constant.
pub fn kick(state: &mut State, derivs: &mut Derivatives, pair: &[bool], h: f64, g_const: f64) {
    let n = state.n;
    for i in 0..n {
        for j in (i + 1)..n {
            if !pair[i * n + j] {
                continue;
            }
            log::trace!("kick: applying fast-kick impulse to pair ({i}, {j})");
            apply_pair_kick(state, derivs, i, j, h, g_const);
        }
    }
}

fn apply_pair_kick(state: &mut State, derivs: &mut Derivatives, i: usize, j: usize, h: f64, g_const: f64) {
    let mi = state.m[i];
    let mj = state.m[j];

    let mut rij = [0.0; 3];
    for k in 0..3 {
        rij[k] = state.x[3 * i + k] - state.x[3 * j + k];
    }
    let r2 = rij[0] * rij[0] + rij[1] * rij[1] + rij[2] * rij[2];
    if r2 == 0.0 {
        return;
    }
    let r = r2.sqrt();
    let r3inv = 1.0 / (r2 * r);
    let r5inv = r3inv / r2;

    // Impulses: v_i -= h*G*m_j*rij/r^3, v_j += h*G*m_i*rij/r^3.
    for k in 0..3 {
        let fac = g_const * rij[k] * r3inv;
        let dvi = -h * mj * fac;
        let dvj = h * mi * fac;
        let idx_i = 3 * i + k;
        let idx_j = 3 * j + k;
        csum_into(&mut state.v[idx_i], &mut state.verror[idx_i], dvi);
        csum_into(&mut state.v[idx_j], &mut state.verror[idx_j], dvj);
    }

    // jac_kick: position-dot-position (3*r^-5*rij⊗rij) and diagonal r^-3
    // terms, plus cross-mass terms, for both bodies' velocity rows.
    let base_i = BLOCK * i;
    let base_j = BLOCK * j;
    for k in 0..3 {
        for p in 0..3 {
            let diag = if k == p { r3inv } else { 0.0 };
            let tensor = diag - 3.0 * r5inv * rij[k] * rij[p];

            let row_vi = base_i + 3 + k;
            let row_vj = base_j + 3 + k;

            // d(Dv_i,k)/d(x_i,p) = -h*G*m_j*tensor ; d/d(x_j,p) = +h*G*m_j*tensor
            derivs.jac_kick[(row_vi, base_i + p)] += -h * g_const * mj * tensor;
            derivs.jac_kick[(row_vi, base_j + p)] += h * g_const * mj * tensor;

            // d(Dv_j,k)/d(x_i,p) = +h*G*m_i*tensor ; d/d(x_j,p) = -h*G*m_i*tensor
            derivs.jac_kick[(row_vj, base_i + p)] += h * g_const * mi * tensor;
            derivs.jac_kick[(row_vj, base_j + p)] += -h * g_const * mi * tensor;
        }
        let fac = g_const * rij[k] * r3inv;
        let row_vi = base_i + 3 + k;
        let row_vj = base_j + 3 + k;
        // cross-mass terms
        derivs.jac_kick[(row_vi, base_j + 6)] += -h * fac; // d(Dv_i)/d(m_j)
        derivs.jac_kick[(row_vj, base_i + 6)] += h * fac; // d(Dv_j)/d(m_i)

        // dqdt_kick: the instantaneous rate this impulse represents,
        // d(Dv)/dh = G*m_other*rij_k*r^-3, signed to match the velocity
        // update above.
        derivs.dqdt_kick[row_vi] += -mj * fac;
        derivs.dqdt_kick[row_vj] += mi * fac;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_body() -> State {
        State::new(
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            vec![1.0, 1e-3],
        )
        .unwrap()
    }

    #[test]
    fn kick_applies_equal_and_opposite_momentum_change() {
        let mut s = two_body();
        let mut d = Derivatives::new(2);
        let pair = [false, true, true, false];
        kick(&mut s, &mut d, &pair, 0.01, 1.0);
        // m_i*dv_i should equal -m_j*dv_j for a two-body impulse pair.
        for k in 0..3 {
            let p_i = s.m[0] * s.v[k];
            let p_j = s.m[1] * s.v[3 + k];
            assert!((p_i + p_j).abs() < 1e-14);
        }
    }

    #[test]
    fn kick_skips_pairs_not_flagged() {
        let mut s = two_body();
        let mut d = Derivatives::new(2);
        let pair = [false, false, false, false];
        kick(&mut s, &mut d, &pair, 0.01, 1.0);
        assert_eq!(s.v, vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert!(d.jac_kick.iter().all(|&v| v == 0.0));
    }
}

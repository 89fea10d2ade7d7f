//! Cross-module scenario tests for the seeded configurations and
//! properties spec.md `# 8` names directly, exercising the public `step`
//! API the way `kirushik-deorbiting` and `nyx-space` split scenario-level
//! physics checks into a top-level `tests/` directory alongside in-module
//! unit tests.

use approx::assert_relative_eq;

use ah18::derivatives::Derivatives;
use ah18::state::{State, BLOCK};
use ah18::step::{step, StepMode};

fn circular_two_body() -> State {
    // m=[1, 1e-3], x=[(0,0,0),(1,0,0)], v=[(0,0,0),(0,1,0)]: a near-circular
    // orbit at unit separation for G*(m1+m2) ~ 1.
    State::new(
        vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
        vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        vec![1.0, 1e-3],
    )
    .unwrap()
}

#[test]
fn two_body_orbit_closes_after_one_period() {
    let mut s = circular_two_body();
    let mut d = Derivatives::new(2);
    let pair = [false, false, false, false];

    // Vis-viva for the seeded relative orbit (r=1, v=1, k=G*(m0+m1)): compute
    // the semi-major axis and period analytically so the step count below
    // covers exactly one orbit, rather than assuming a fixed step count
    // happens to match an arbitrary period.
    let k = 1.0 * (s.m[0] + s.m[1]);
    let r = 1.0;
    let v = 1.0;
    let energy = 0.5 * v * v - k / r;
    let a = -k / (2.0 * energy);
    let period = 2.0 * std::f64::consts::PI * (a.powi(3) / k).sqrt();

    let steps = 200;
    let h = period / steps as f64;

    let x0 = s.x.clone();
    for _ in 0..steps {
        step(&mut s, &mut d, h, &pair, 1.0, StepMode::Full);
    }

    for idx in 0..6 {
        assert!(
            (s.x[idx] - x0[idx]).abs() < 1e-6,
            "index {idx}: {} vs {}",
            s.x[idx],
            x0[idx]
        );
    }

    let det = s.jac_step.clone().determinant();
    assert_relative_eq!(det, 1.0, epsilon = 1e-9);
}

#[test]
fn mass_rows_stay_identity_after_many_steps() {
    let mut s = circular_two_body();
    let mut d = Derivatives::new(2);
    let pair = [false, false, false, false];

    for _ in 0..50 {
        step(&mut s, &mut d, 0.02, &pair, 1.0, StepMode::Full);
    }

    for i in 0..s.n {
        let mass_row = BLOCK * i + 6;
        for c in 0..s.dim() {
            let expected = if c == mass_row { 1.0 } else { 0.0 };
            assert_relative_eq!(s.jac_step[(mass_row, c)], expected, epsilon = 1e-8);
        }
    }
}

#[test]
fn three_body_hierarchical_inner_pair_selection_agrees_to_h4() {
    // Inner pair (0,1) tight, distant perturber (2) far away. Toggling
    // pair[0,1]/pair[1,0] between the fast-kick and Kepler-drift branches
    // should agree to ~h^4 relative error over a short integration.
    let make_state = || {
        State::new(
            vec![0.0, 0.0, 0.0, 0.2, 0.0, 0.0, 5.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 2.2, 0.0, 0.0, 0.05, 0.0],
            vec![1.0, 1e-4, 1e-3],
        )
        .unwrap()
    };

    let mut s_kepler = make_state();
    let mut d_kepler = Derivatives::new(3);
    #[rustfmt::skip]
    let pair_kepler = [
        false, false, true,
        false, false, true,
        true,  true,  false,
    ];

    let mut s_kick = make_state();
    let mut d_kick = Derivatives::new(3);
    #[rustfmt::skip]
    let pair_kick = [
        false, true, true,
        true,  false, true,
        true,  true,  false,
    ];

    let h = 0.001;
    for _ in 0..20 {
        step(&mut s_kepler, &mut d_kepler, h, &pair_kepler, 1.0, StepMode::Full);
        step(&mut s_kick, &mut d_kick, h, &pair_kick, 1.0, StepMode::Full);
    }

    // A loose, order-of-magnitude bound on the h^4 agreement spec.md `# 8`
    // describes, rather than a tight bound on the exact constant in front of
    // h^4 (which depends on the specific masses/separations chosen above).
    let tol = 1e-6;
    for idx in 0..9 {
        let scale = s_kepler.x[idx].abs().max(1.0);
        assert!(
            (s_kepler.x[idx] - s_kick.x[idx]).abs() / scale < tol,
            "x[{idx}]: kepler={} kick={} tol={tol}",
            s_kepler.x[idx],
            s_kick.x[idx]
        );
    }
}

#[test]
fn degenerate_all_zero_mass_step_is_exactly_block_diagonal_drift() {
    // With every mass exactly zero, the Kepler solve is a k=0 no-op and the
    // fast-kick/Phi impulses vanish (they scale with the *current* mass
    // values), so the physical update is a pure drift and every
    // position/velocity *row and column* of jac_step matches the
    // block-diagonal drift Jacobian exactly. Mass *columns* are excluded:
    // d(x')/d(mass) is a genuine, generally nonzero sensitivity even at
    // mass = 0 (e.g. Phi_alpha's mass-column partial, `-G*rij/r^3`, does not
    // itself depend on the current mass value), so only the mass *rows*
    // (mass is a constant parameter, not an evolving variable) are checked.
    let mut s = State::new(
        vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
        vec![0.1, 0.0, 0.0, 0.0, 0.2, 0.0],
        vec![0.0, 0.0],
    )
    .unwrap();
    let mut d = Derivatives::new(2);
    let pair = [false, false, false, false];
    let h = 0.1;

    step(&mut s, &mut d, h, &pair, 1.0, StepMode::Full);

    for i in 0..s.n {
        let base = BLOCK * i;
        for k in 0..3 {
            let row = base + k;
            let vel_row = base + 3 + k;
            for j in 0..s.n {
                let other_base = BLOCK * j;
                for c in other_base..(other_base + 6) {
                    let expected = if c == row {
                        1.0
                    } else if c == vel_row {
                        h
                    } else {
                        0.0
                    };
                    assert_relative_eq!(s.jac_step[(row, c)], expected, epsilon = 1e-9);
                }
            }
        }
        for row in (base + 3)..(base + 7) {
            for c in 0..s.dim() {
                let expected = if c == row { 1.0 } else { 0.0 };
                assert_relative_eq!(s.jac_step[(row, c)], expected, epsilon = 1e-9);
            }
        }
    }
}

#[test]
fn reversing_a_step_returns_state_to_within_a_few_epsilons_per_step() {
    let mut s = circular_two_body();
    let mut d = Derivatives::new(2);
    let pair = [false, false, false, false];
    let h = 0.03;
    let x0 = s.x.clone();
    let v0 = s.v.clone();

    step(&mut s, &mut d, h, &pair, 1.0, StepMode::Full);
    step(&mut s, &mut d, -h, &pair, 1.0, StepMode::Full);

    for idx in 0..6 {
        assert!((s.x[idx] - x0[idx]).abs() < 1e-10);
        assert!((s.v[idx] - v0[idx]).abs() < 1e-10);
    }
}

mod reversibility_properties {
    use super::*;
    use ah18::kepler::jac_delxv_gamma;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Testable property #1 over randomly sampled two-body initial
        /// conditions (mass ratio, semi-major axis via separation, and
        /// eccentricity via the speed at periapsis), complementing the
        /// fixed seeded scenario above.
        #[test]
        fn kepler_drift_forward_then_backward_is_identity(
            mass_ratio in 1e-4f64..1.0,
            separation in 0.2f64..5.0,
            eccentricity_speed_factor in 0.5f64..1.5,
        ) {
            let mi = 1.0;
            let mj = mass_ratio;
            let k = mi + mj;
            let x0 = [separation, 0.0, 0.0];
            let circular_speed = (k / separation).sqrt();
            let v0 = [0.0, circular_speed * eccentricity_speed_factor, 0.0];
            let h = 0.01;

            let forward = jac_delxv_gamma(x0, v0, k, h, true);
            let mut x1 = [0.0; 3];
            let mut v1 = [0.0; 3];
            for a in 0..3 {
                x1[a] = x0[a] + forward.delxv[a];
                v1[a] = v0[a] + forward.delxv[3 + a];
            }

            let backward = jac_delxv_gamma(x1, v1, k, -h, true);
            for a in 0..3 {
                let x_back = x1[a] + backward.delxv[a];
                let v_back = v1[a] + backward.delxv[3 + a];
                prop_assert!((x_back - x0[a]).abs() < 1e-8);
                prop_assert!((v_back - v0[a]).abs() < 1e-8);
            }
        }
    }
}

//! Universal-variable Kepler solver (spec `# 4.3`): given a relative state
//! and a reduced mass, advances the pair by one drift-Kepler-drift step and
//! returns the converged universal anomaly alongside the 6-vector Delta(x,v).

use crate::stumpff::{g_functions, GFunctions};

/// Hard cap on Newton iterations (spec `# 4.3`: "fail-open: accept last
/// value"). The comparison-equal termination makes hitting this rare; when
/// it is hit, the caller logs a warning and keeps degraded accuracy rather
/// than treating it as an error (spec `# 7`).
pub const MAX_NEWTON_ITERS: u32 = 20;

/// Intermediate quantities from one converged Kepler-gamma solve, kept
/// around because `kepler::jacobian` differentiates through every one of
/// them.
#[derive(Debug, Clone, Copy)]
pub struct GammaSolution {
    pub gamma: f64,
    pub beta: f64,
    pub r0: f64,
    pub eta: f64,
    pub zeta: f64,
    pub g: GFunctions,
    pub r: f64,
    pub iterations: u32,
    pub converged: bool,
}

/// The 6-vector Kepler-drift increment plus the solver state it was built
/// from (the latter is what `compute_jacobian_gamma` needs).
#[derive(Debug, Clone, Copy)]
pub struct KeplerDrift {
    pub delxv: [f64; 6],
    pub solution: GammaSolution,
}

fn dot3(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn sub3(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn norm3(a: [f64; 3]) -> f64 {
    dot3(a, a).sqrt()
}

/// Real root of `a*g^3 + b*g^2 + c*g + d = 0` used to seed Newton's method
/// when `zeta != 0` (spec `# 4.3` step 3). Obtained from the small-gamma
/// Taylor expansion of `F(gamma) = r0*G1 + eta*G2 + k*G3 - h`, which to
/// cubic order is `(zeta/6)*g^3 + (eta/2)*g^2 + r0*g - h` (the G1 beta-
/// correction term combines with k*G3's leading term into `zeta*g^3/6`,
/// which is exactly why the spec's "initial guess" branches on zeta).
fn cubic_root(zeta: f64, eta: f64, r0: f64, h: f64) -> f64 {
    // Depressed cubic via Cardano: g^3 + p*g + q = 0 after dividing by
    // zeta/6 and substituting g = y - b/(3a).
    let a = zeta / 6.0;
    let b = eta / 2.0;
    let c = r0;
    let d = -h;
    let shift = -b / (3.0 * a);
    let p = (3.0 * a * c - b * b) / (3.0 * a * a);
    let q = (2.0 * b * b * b - 9.0 * a * b * c + 27.0 * a * a * d) / (27.0 * a * a * a);
    let discriminant = (q * q / 4.0) + (p * p * p / 27.0);
    let y = if discriminant >= 0.0 {
        let sqrt_disc = discriminant.sqrt();
        let u = (-q / 2.0 + sqrt_disc).cbrt();
        let v = (-q / 2.0 - sqrt_disc).cbrt();
        u + v
    } else {
        // Three real roots; take the one continuous with the small-gamma
        // branch (largest root nearest the linear estimate h/r0).
        let r = (-p * p * p / 27.0).sqrt();
        let phi = (-q / (2.0 * r)).clamp(-1.0, 1.0).acos();
        let m = 2.0 * (-p / 3.0).sqrt();
        let candidates = [
            m * (phi / 3.0).cos(),
            m * ((phi + 2.0 * std::f64::consts::PI) / 3.0).cos(),
            m * ((phi + 4.0 * std::f64::consts::PI) / 3.0).cos(),
        ];
        let linear = h / r0;
        *candidates
            .iter()
            .min_by(|x, y| {
                ((**x + shift) - linear)
                    .abs()
                    .partial_cmp(&((**y + shift) - linear).abs())
                    .unwrap()
            })
            .unwrap()
    };
    y + shift
}

fn initial_guess(zeta: f64, eta: f64, r0: f64, beta: f64, h: f64) -> f64 {
    if zeta != 0.0 {
        cubic_root(zeta, eta, r0, h)
    } else if eta != 0.0 {
        // (eta/2)*g^2 + r0*g - h = 0, positive root.
        let disc = r0 * r0 + 2.0 * eta * h;
        (-r0 + disc.max(0.0).sqrt()) / eta
    } else {
        h / r0 * beta.abs().sqrt()
    }
}

/// Newton-solve the universal Kepler time equation
/// `F(gamma) = r0*G1 + eta*G2 + k*G3 - h = 0` for `gamma`, using
/// `dF/dgamma = r = r0*G0 + eta*G1 + k*G2` (an identity of the G-function
/// recursion, spec `# 4.2`). Equivalent to the raw sin/cos (or sinh/cosh)
/// coefficient form spec `# 4.3` step 4 names; packaged through `G0..G3` so
/// the elliptic/hyperbolic/parabolic dispatch lives in one place
/// (`stumpff::g_functions`).
pub fn solve_gamma(r0: f64, eta: f64, beta: f64, k: f64, h: f64) -> GammaSolution {
    let zeta = k - r0 * beta;
    let mut gamma = initial_guess(zeta, eta, r0, beta, h);
    let mut iterations = 0;
    let mut converged = false;
    let mut g = g_functions(beta, gamma);
    let mut r = r0 * g.g0 + eta * g.g1 + k * g.g2;

    for _ in 0..MAX_NEWTON_ITERS {
        iterations += 1;
        let f = r0 * g.g1 + eta * g.g2 + k * g.g3 - h;
        let step = f / r;
        let next = gamma - step;
        if next == gamma {
            converged = true;
            gamma = next;
            g = g_functions(beta, gamma);
            r = r0 * g.g0 + eta * g.g1 + k * g.g2;
            break;
        }
        gamma = next;
        g = g_functions(beta, gamma);
        r = r0 * g.g0 + eta * g.g1 + k * g.g2;
    }

    if !converged {
        log::warn!(
            "kepler gamma solver hit the {}-iteration cap without convergence (gamma={gamma})",
            MAX_NEWTON_ITERS
        );
    }

    GammaSolution {
        gamma,
        beta,
        r0,
        eta,
        zeta,
        g,
        r,
        iterations,
        converged,
    }
}

/// Given the relative two-body state `(x0, v0)`, reduced mass `k`, and step
/// `h`, solves for `gamma` and returns the 6-vector Kepler-drift increment
/// Delta(x,v), following spec `# 4.3`.
///
/// `k == 0` is the degenerate-pair no-op (spec `# 7`): the relative motion
/// is undefined without mass, so the increment is exactly zero.
pub fn jac_delxv_gamma(x0: [f64; 3], v0: [f64; 3], k: f64, h: f64, drift_first: bool) -> KeplerDrift {
    if k == 0.0 {
        let solution = GammaSolution {
            gamma: 0.0,
            beta: 0.0,
            r0: norm3(x0),
            eta: 0.0,
            zeta: 0.0,
            g: GFunctions {
                g0: 1.0,
                g1: 0.0,
                g2: 0.0,
                g3: 0.0,
            },
            r: norm3(x0),
            iterations: 0,
            converged: true,
        };
        return KeplerDrift {
            delxv: [0.0; 6],
            solution,
        };
    }

    let xp = if drift_first {
        sub3(x0, [h * v0[0], h * v0[1], h * v0[2]])
    } else {
        x0
    };
    let r0 = norm3(xp);
    let beta = 2.0 * k / r0 - dot3(v0, v0);
    let eta = dot3(xp, v0);

    let solution = solve_gamma(r0, eta, beta, k, h);
    let g = solution.g;
    let r = solution.r;

    let f = 1.0 - (k / r0) * g.g2;
    let gcoef = h - k * g.g3;
    let fdot = -(k / (r0 * r)) * g.g1;
    let gdot = 1.0 - (k / r) * g.g2;

    let mut delxv = [0.0; 6];
    if drift_first {
        for i in 0..3 {
            delxv[i] = (f - 1.0) * x0[i] + (gcoef - f * h) * v0[i];
            delxv[3 + i] = fdot * x0[i] + (gdot - 1.0 - fdot * h) * v0[i];
        }
    } else {
        for i in 0..3 {
            delxv[i] = (f - 1.0) * x0[i] + gcoef * v0[i];
            delxv[3 + i] = fdot * x0[i] + (gdot - 1.0) * v0[i];
        }
    }

    KeplerDrift { delxv, solution }
}

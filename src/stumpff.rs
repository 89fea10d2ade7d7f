//! Universal-variable Stumpff/G-function kernel.
//!
//! `G0..G3` are the standard Wisdom & Hernandez (2015) universal-variable
//! basis functions of the half-angle variable `gamma` and the energy
//! parameter `beta` (positive for bound/elliptic pairs, negative for
//! hyperbolic, zero at the parabolic limit). They satisfy the recursion
//! `dG0/dgamma = -beta*G1`, `dG1/dgamma = G0`, `dG2/dgamma = G1`,
//! `dG3/dgamma = G2`, which is what makes `dF/dgamma = r` in the Kepler
//! time equation (see `kepler::gamma`).
//!
//! `H1..H8` extend the same family (`G4..G11`) via the generalized Stumpff
//! series. The original `NbodyGradient.jl` lineage this crate's specification
//! distills from could not be retrieved in full (see DESIGN.md, "H1..H8 exact
//! closed forms") so the combinations used for cancellation-sensitive terms
//! in `kepler::jacobian` are an original derivation built on this recursive
//! family rather than a transcription of the original's exact auxiliary
//! functions.

/// Below this magnitude of `x = beta*gamma^2`, the closed trigonometric or
/// hyperbolic form loses precision to cancellation and the Taylor series is
/// used instead. `0.1` keeps the series to a handful of terms while staying
/// well clear of the cancellation region.
const SERIES_THRESHOLD: f64 = 0.1;

const MAX_SERIES_TERMS: u32 = 30;

/// Generalized Stumpff series: `gamma^n * sum_{k=0}^inf (-x)^k / (n+2k)!`
/// where `x = beta*gamma^2`. Converges quickly for the bounded `gamma` the
/// Kepler solver maintains by construction (spec `# 4.2`).
fn g_series(n: u32, x: f64, gamma: f64) -> f64 {
    let mut term = 1.0 / factorial(n);
    let mut sum = term;
    let mut k = 1u32;
    while k < MAX_SERIES_TERMS {
        term *= -x / ((n + 2 * k - 1) as f64 * (n + 2 * k) as f64);
        sum += term;
        if term.abs() < f64::EPSILON * sum.abs() {
            break;
        }
        k += 1;
    }
    sum * gamma.powi(n as i32)
}

fn factorial(n: u32) -> f64 {
    (1..=n as u64).fold(1.0_f64, |acc, k| acc * k as f64)
}

/// The four basis functions used throughout the Kepler-drift solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GFunctions {
    pub g0: f64,
    pub g1: f64,
    pub g2: f64,
    pub g3: f64,
}

/// Evaluate `G0..G3` at the given `beta`, `gamma`, dispatching on the sign of
/// `beta` for the closed form and falling back to the series near the
/// parabolic limit, exactly as spec `# 9` ("branching sin/cos vs sinh/cosh")
/// directs.
pub fn g_functions(beta: f64, gamma: f64) -> GFunctions {
    let x = beta * gamma * gamma;
    if x.abs() < SERIES_THRESHOLD {
        return GFunctions {
            g0: g_series(0, x, gamma),
            g1: g_series(1, x, gamma),
            g2: g_series(2, x, gamma),
            g3: g_series(3, x, gamma),
        };
    }
    if beta > 0.0 {
        let sqb = beta.sqrt();
        let z = sqb * gamma;
        let g0 = z.cos();
        let g1 = z.sin() / sqb;
        GFunctions {
            g0,
            g1,
            g2: (1.0 - g0) / beta,
            g3: (gamma - g1) / beta,
        }
    } else {
        let sqb = (-beta).sqrt();
        let z = sqb * gamma;
        let g0 = z.cosh();
        let g1 = z.sinh() / sqb;
        GFunctions {
            g0,
            g1,
            g2: (1.0 - g0) / beta,
            g3: (gamma - g1) / beta,
        }
    }
}

/// `H1..H8 = G4..G11` of the same generalized-Stumpff family, evaluated via
/// the series path only (they are auxiliary cancellation-avoidance helpers,
/// not on the Newton-iteration hot path, so the closed trig/hyperbolic form's
/// extra speed is not worth the added branching here).
pub fn h_functions(beta: f64, gamma: f64) -> [f64; 8] {
    let x = beta * gamma * gamma;
    let mut out = [0.0; 8];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = g_series(4 + i as u32, x, gamma);
    }
    out
}

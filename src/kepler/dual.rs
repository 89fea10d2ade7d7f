//! A minimal forward-mode dual number, used only to differentiate the
//! universal Kepler formulas in [`super::jacobian`] mechanically instead of
//! by hand. Grounded on the `Dual { val, eps }` forward-mode type in
//! `hinsley-Fork/crates/fork_core/src/autodiff.rs`, scoped down to the
//! handful of operations the Kepler drift formulas actually use (no
//! `num-traits::Float` surface, since nothing outside this crate ever sees
//! the type).

#[derive(Debug, Clone, Copy)]
pub struct Dual {
    pub v: f64,
    pub d: f64,
}

impl Dual {
    /// Lift a plain constant (zero derivative).
    pub fn c(v: f64) -> Self {
        Dual { v, d: 0.0 }
    }

    /// A variable with respect to which we are differentiating in this pass.
    pub fn var(v: f64) -> Self {
        Dual { v, d: 1.0 }
    }

    pub fn recip(self) -> Self {
        Dual {
            v: 1.0 / self.v,
            d: -self.d / (self.v * self.v),
        }
    }

    pub fn sqrt(self) -> Self {
        let s = self.v.sqrt();
        Dual {
            v: s,
            d: self.d / (2.0 * s),
        }
    }

    pub fn sin(self) -> Self {
        Dual {
            v: self.v.sin(),
            d: self.d * self.v.cos(),
        }
    }

    pub fn cos(self) -> Self {
        Dual {
            v: self.v.cos(),
            d: -self.d * self.v.sin(),
        }
    }

    pub fn sinh(self) -> Self {
        Dual {
            v: self.v.sinh(),
            d: self.d * self.v.cosh(),
        }
    }

    pub fn cosh(self) -> Self {
        Dual {
            v: self.v.cosh(),
            d: self.d * self.v.sinh(),
        }
    }
}

impl std::ops::Add for Dual {
    type Output = Dual;
    fn add(self, rhs: Dual) -> Dual {
        Dual {
            v: self.v + rhs.v,
            d: self.d + rhs.d,
        }
    }
}

impl std::ops::Sub for Dual {
    type Output = Dual;
    fn sub(self, rhs: Dual) -> Dual {
        Dual {
            v: self.v - rhs.v,
            d: self.d - rhs.d,
        }
    }
}

impl std::ops::Mul for Dual {
    type Output = Dual;
    fn mul(self, rhs: Dual) -> Dual {
        Dual {
            v: self.v * rhs.v,
            d: self.d * rhs.v + self.v * rhs.d,
        }
    }
}

impl std::ops::Div for Dual {
    type Output = Dual;
    fn div(self, rhs: Dual) -> Dual {
        self * rhs.recip()
    }
}

impl std::ops::Neg for Dual {
    type Output = Dual;
    fn neg(self) -> Dual {
        Dual {
            v: -self.v,
            d: -self.d,
        }
    }
}

impl std::ops::Mul<f64> for Dual {
    type Output = Dual;
    fn mul(self, rhs: f64) -> Dual {
        Dual {
            v: self.v * rhs,
            d: self.d * rhs,
        }
    }
}

impl std::ops::Sub<f64> for Dual {
    type Output = Dual;
    fn sub(self, rhs: f64) -> Dual {
        Dual {
            v: self.v - rhs,
            d: self.d,
        }
    }
}

/// The four G-functions evaluated on duals, mirroring
/// `stumpff::g_functions`'s series/closed-form dispatch so that derivatives
/// flow through whichever branch the scalar evaluation actually takes.
pub struct GDual {
    pub g0: Dual,
    pub g1: Dual,
    pub g2: Dual,
    pub g3: Dual,
}

const SERIES_THRESHOLD: f64 = 0.1;
const MAX_SERIES_TERMS: u32 = 30;

fn factorial(n: u32) -> f64 {
    (1..=n as u64).fold(1.0_f64, |acc, k| acc * k as f64)
}

fn g_series_dual(n: u32, x: Dual, gamma: Dual) -> Dual {
    let mut term = Dual::c(1.0 / factorial(n));
    let mut sum = term;
    let mut k = 1u32;
    while k < MAX_SERIES_TERMS {
        let denom = (n + 2 * k - 1) as f64 * (n + 2 * k) as f64;
        term = (term * (Dual::c(0.0) - x)) * (1.0 / denom);
        sum = sum + term;
        if term.v.abs() < f64::EPSILON * sum.v.abs() {
            break;
        }
        k += 1;
    }
    let mut pow = Dual::c(1.0);
    for _ in 0..n {
        pow = pow * gamma;
    }
    sum * pow
}

pub fn g_functions_dual(beta: Dual, gamma: Dual) -> GDual {
    let x = beta * gamma * gamma;
    if x.v.abs() < SERIES_THRESHOLD {
        return GDual {
            g0: g_series_dual(0, x, gamma),
            g1: g_series_dual(1, x, gamma),
            g2: g_series_dual(2, x, gamma),
            g3: g_series_dual(3, x, gamma),
        };
    }
    if beta.v > 0.0 {
        let sqb = beta.sqrt();
        let z = sqb * gamma;
        let g0 = z.cos();
        let g1 = z.sin() / sqb;
        GDual {
            g0,
            g1,
            g2: (Dual::c(1.0) - g0) / beta,
            g3: (gamma - g1) / beta,
        }
    } else {
        let sqb = (beta * -1.0).sqrt();
        let z = sqb * gamma;
        let g0 = z.cosh();
        let g1 = z.sinh() / sqb;
        GDual {
            g0,
            g1,
            g2: (Dual::c(1.0) - g0) / beta,
            g3: (gamma - g1) / beta,
        }
    }
}

impl std::ops::Mul<Dual> for f64 {
    type Output = Dual;
    fn mul(self, rhs: Dual) -> Dual {
        rhs * self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mul_matches_product_rule() {
        let a = Dual::var(2.0);
        let b = Dual::c(3.0);
        let p = a * b;
        assert_relative_eq!(p.v, 6.0);
        assert_relative_eq!(p.d, 3.0);
    }

    #[test]
    fn sqrt_matches_known_derivative() {
        let a = Dual::var(4.0);
        let s = a.sqrt();
        assert_relative_eq!(s.v, 2.0);
        assert_relative_eq!(s.d, 1.0 / 4.0);
    }

    #[test]
    fn g_functions_dual_matches_scalar_value() {
        let beta = Dual::c(0.6);
        let gamma = Dual::c(0.8);
        let g = g_functions_dual(beta, gamma);
        let scalar = crate::stumpff::g_functions(0.6, 0.8);
        assert_relative_eq!(g.g0.v, scalar.g0, epsilon = 1e-12);
        assert_relative_eq!(g.g1.v, scalar.g1, epsilon = 1e-12);
        assert_relative_eq!(g.g2.v, scalar.g2, epsilon = 1e-12);
        assert_relative_eq!(g.g3.v, scalar.g3, epsilon = 1e-12);
    }

    #[test]
    fn g_functions_dual_derivative_matches_finite_difference_in_gamma() {
        let beta = Dual::c(0.6);
        let eps = 1e-6;
        let gp = g_functions_dual(beta, Dual::c(0.8 + eps));
        let gm = g_functions_dual(beta, Dual::c(0.8 - eps));
        let g = g_functions_dual(beta, Dual::var(0.8));
        let fd = (gp.g0.v - gm.g0.v) / (2.0 * eps);
        assert_relative_eq!(g.g0.d, fd, epsilon = 1e-6);
    }
}

//! Bracketing scalar root finder (Brent's method).

use ns_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Brent root solver with absolute/relative step and residual tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Brent {
    /// Absolute tolerance on the root location (default 1e-5).
    pub absolute_error: f64,
    /// Relative tolerance on the root location (default 1e-5).
    pub relative_error: f64,
    /// Stop once `|f(x)| <= residual_error` (default 1e-8).
    pub residual_error: f64,
    /// Iteration cap (default 100).
    pub max_iterations: usize,
}

impl Default for Brent {
    fn default() -> Self {
        Self {
            absolute_error: 1e-5,
            relative_error: 1e-5,
            residual_error: 1e-8,
            max_iterations: 100,
        }
    }
}

impl Brent {
    /// Validate tolerances.
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("absolute_error", self.absolute_error),
            ("relative_error", self.relative_error),
            ("residual_error", self.residual_error),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::Validation(format!(
                    "{} must be finite and >= 0, got {}",
                    name, v
                )));
            }
        }
        if self.max_iterations == 0 {
            return Err(Error::Validation("max_iterations must be > 0".into()));
        }
        Ok(())
    }

    /// Find a root of `f` in `[a, b]` given `f(a)` and `f(b)` of opposite signs.
    ///
    /// Returns the best iterate when the iteration cap is hit.
    pub fn solve<F>(&self, mut f: F, a: f64, b: f64, fa: f64, fb: f64) -> Result<f64>
    where
        F: FnMut(f64) -> Result<f64>,
    {
        if fa == 0.0 {
            return Ok(a);
        }
        if fb == 0.0 {
            return Ok(b);
        }
        if (fa > 0.0) == (fb > 0.0) {
            return Err(Error::Validation(format!(
                "root is not bracketed: f({})={} and f({})={}",
                a, fa, b, fb
            )));
        }

        let (mut a, mut b, mut fa, mut fb) = (a, b, fa, fb);
        let (mut c, mut fc) = (b, fb);
        let mut d = b - a;
        let mut e = d;

        for _ in 0..self.max_iterations {
            if (fb > 0.0) == (fc > 0.0) {
                c = a;
                fc = fa;
                d = b - a;
                e = d;
            }
            if fc.abs() < fb.abs() {
                a = b;
                b = c;
                c = a;
                fa = fb;
                fb = fc;
                fc = fa;
            }
            let tol = 0.5 * (self.absolute_error + self.relative_error * b.abs());
            let xm = 0.5 * (c - b);
            if xm.abs() <= tol || fb.abs() <= self.residual_error {
                return Ok(b);
            }
            if e.abs() >= tol && fa.abs() > fb.abs() {
                // Inverse quadratic interpolation (secant when a == c).
                let s = fb / fa;
                let (mut p, mut q);
                if a == c {
                    p = 2.0 * xm * s;
                    q = 1.0 - s;
                } else {
                    let qa = fa / fc;
                    let r = fb / fc;
                    p = s * (2.0 * xm * qa * (qa - r) - (b - a) * (r - 1.0));
                    q = (qa - 1.0) * (r - 1.0) * (s - 1.0);
                }
                if p > 0.0 {
                    q = -q;
                }
                p = p.abs();
                let min1 = 3.0 * xm * q - (tol * q).abs();
                let min2 = (e * q).abs();
                if 2.0 * p < min1.min(min2) {
                    e = d;
                    d = p / q;
                } else {
                    d = xm;
                    e = d;
                }
            } else {
                d = xm;
                e = d;
            }
            a = b;
            fa = fb;
            b += if d.abs() > tol { d } else { tol.copysign(xm) };
            fb = f(b)?;
        }
        log::debug!("Brent: iteration cap {} reached at x={}", self.max_iterations, b);
        Ok(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cubic_root() {
        let f = |x: f64| Ok(x * x * x - 2.0);
        let solver = Brent {
            absolute_error: 1e-12,
            relative_error: 1e-12,
            residual_error: 0.0,
            max_iterations: 200,
        };
        let r = solver.solve(f, 0.0, 3.0, -2.0, 25.0).unwrap();
        assert_relative_eq!(r, 2f64.powf(1.0 / 3.0), epsilon = 1e-10);
    }

    #[test]
    fn test_not_bracketed() {
        let r = Brent::default().solve(|x: f64| Ok(x * x + 1.0), -1.0, 1.0, 2.0, 2.0);
        assert!(r.is_err());
    }

    #[test]
    fn test_error_propagates() {
        let r = Brent::default().solve(
            |_x: f64| Err(Error::Computation("model failed".into())),
            0.0,
            1.0,
            -1.0,
            1.0,
        );
        assert!(matches!(r, Err(Error::Computation(_))));
    }

    #[test]
    fn test_default_tolerance() {
        let r = Brent::default().solve(|x: f64| Ok(x - 0.3), 0.0, 8.0, -0.3, 7.7).unwrap();
        assert!((r - 0.3).abs() < 1e-5);
    }
}

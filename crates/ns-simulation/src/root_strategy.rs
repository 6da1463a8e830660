//! Root localisation along a ray of the standard space.

use ns_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::solver::Brent;

/// How roots are searched on `[0, maximum_distance]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootSearch {
    /// One bracket on the whole segment: at most one root, sign changes in between are missed.
    RiskyAndFast,
    /// Scan with `step_size`, keep the first root.
    #[default]
    MediumSafe,
    /// Scan with `step_size`, keep every root.
    SafeAndSlow,
}

/// Root strategy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootStrategy {
    /// Search flavour.
    pub search: RootSearch,
    /// Radius beyond which the radial law is treated as negligible (default 8).
    pub maximum_distance: f64,
    /// Scan step (default 1).
    pub step_size: f64,
    /// Solver used inside each bracket.
    pub solver: Brent,
}

impl Default for RootStrategy {
    fn default() -> Self {
        Self {
            search: RootSearch::default(),
            maximum_distance: 8.0,
            step_size: 1.0,
            solver: Brent::default(),
        }
    }
}

impl RootStrategy {
    /// Strategy with the given search flavour and default distances.
    pub fn new(search: RootSearch) -> Self {
        Self { search, ..Default::default() }
    }

    /// Validate distances and solver tolerances.
    pub fn validate(&self) -> Result<()> {
        if !self.maximum_distance.is_finite() || self.maximum_distance <= 0.0 {
            return Err(Error::Validation(format!(
                "maximum_distance must be finite and > 0, got {}",
                self.maximum_distance
            )));
        }
        if !self.step_size.is_finite() || self.step_size <= 0.0 {
            return Err(Error::Validation(format!(
                "step_size must be finite and > 0, got {}",
                self.step_size
            )));
        }
        self.solver.validate()
    }

    /// Roots of `f` on `(0, maximum_distance]`, sorted increasingly.
    ///
    /// `f0` is `f(0)`. A segment without a sign change contributes no root.
    pub fn solve<F>(&self, mut f: F, f0: f64) -> Result<Vec<f64>>
    where
        F: FnMut(f64) -> Result<f64>,
    {
        let mut roots = Vec::new();
        if self.search == RootSearch::RiskyAndFast {
            let fmax = f(self.maximum_distance)?;
            if changes_sign(f0, fmax) {
                roots.push(self.solver.solve(&mut f, 0.0, self.maximum_distance, f0, fmax)?);
            }
            return Ok(roots);
        }

        let mut a = 0.0;
        let mut fa = f0;
        while a < self.maximum_distance {
            let b = (a + self.step_size).min(self.maximum_distance);
            let fb = f(b)?;
            if changes_sign(fa, fb) {
                roots.push(self.solver.solve(&mut f, a, b, fa, fb)?);
                if self.search == RootSearch::MediumSafe {
                    break;
                }
            }
            a = b;
            fa = fb;
        }
        Ok(roots)
    }
}

#[inline]
fn changes_sign(fa: f64, fb: f64) -> bool {
    (fa < 0.0) != (fb < 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Sign changes at r = 1.5, 3.5, 5.5
    fn wavy(r: f64) -> Result<f64> {
        Ok((r - 1.5) * (r - 3.5) * (r - 5.5))
    }

    #[test]
    fn test_safe_and_slow_finds_all_roots() {
        let s = RootStrategy::new(RootSearch::SafeAndSlow);
        let roots = s.solve(wavy, wavy(0.0).unwrap()).unwrap();
        assert_eq!(roots.len(), 3);
        for (r, e) in roots.iter().zip([1.5, 3.5, 5.5]) {
            assert!((r - e).abs() < 1e-4, "root {} vs {}", r, e);
        }
    }

    #[test]
    fn test_medium_safe_stops_at_first() {
        let s = RootStrategy::new(RootSearch::MediumSafe);
        let roots = s.solve(wavy, wavy(0.0).unwrap()).unwrap();
        assert_eq!(roots.len(), 1);
        assert!((roots[0] - 1.5).abs() < 1e-4);
    }

    #[test]
    fn test_risky_and_fast_single_bracket() {
        let s = RootStrategy::new(RootSearch::RiskyAndFast);
        // Odd number of sign changes over [0, 8]: one root found.
        assert_eq!(s.solve(wavy, wavy(0.0).unwrap()).unwrap().len(), 1);
        // Even number of changes: nothing found, no error.
        let even = |r: f64| Ok((r - 1.0) * (r - 2.0));
        assert!(s.solve(even, 2.0).unwrap().is_empty());
    }

    #[test]
    fn test_validation() {
        let mut s = RootStrategy::default();
        s.step_size = 0.0;
        assert!(s.validate().is_err());
        s = RootStrategy { maximum_distance: -1.0, ..Default::default() };
        assert!(s.validate().is_err());
    }
}

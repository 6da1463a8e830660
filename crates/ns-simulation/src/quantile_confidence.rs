//! Order-statistics confidence bounds for quantiles.
//!
//! For an i.i.d. sample of size `N` with sorted values `X_(0) <= ... <= X_(N-1)`
//! and the `alpha`-quantile `x_alpha`, the number of points below `x_alpha`
//! follows `Binom(N, alpha)`:
//!
//! ```text
//! P(X_(k) >= x_alpha)                 = P(B <= k)
//! P(X_(k) <= x_alpha)                 = P(B >= k + 1)
//! P(X_(k1) <= x_alpha <= X_(k2))      = P(B <= k2) - P(B <= k1)
//! ```
//!
//! Ranks are 0-based. For minimum sample sizes the `rank` counts from the top
//! (upper bound, `tail = false`) or from the bottom (lower bound, `tail = true`):
//! rank 0 with `alpha = 0.95` (upper) or `alpha = 0.05` (lower) and `beta = 0.95`
//! gives the classical 59.

use ns_core::{Error, Result};
use ns_prob::binomial;
use ns_prob::math::std_normal_quantile;

use crate::solver::Brent;

/// Confidence statements about the `alpha`-quantile at confidence `beta`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantileConfidence {
    alpha: f64,
    beta: f64,
}

impl QuantileConfidence {
    /// Both levels must lie strictly inside `(0, 1)`.
    pub fn new(alpha: f64, beta: f64) -> Result<Self> {
        check_level("alpha", alpha)?;
        check_level("beta", beta)?;
        Ok(Self { alpha, beta })
    }

    /// Quantile level.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Confidence level.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Rank `k` of the tightest one-sided bound for a sample of `size`.
    ///
    /// `tail = false`: smallest `k` with `P(X_(k) >= x_alpha) >= beta`.
    /// `tail = true`: largest `k` with `P(X_(k) <= x_alpha) >= beta`.
    pub fn unilateral_rank(&self, size: usize, tail: bool) -> Result<usize> {
        check_size(size)?;
        let n = size as u64;
        if !tail {
            for k in 0..n {
                if binomial::cdf(k, n, self.alpha)? >= self.beta {
                    return Ok(k as usize);
                }
            }
        } else {
            for k in (0..n).rev() {
                if binomial::sf_inclusive(k + 1, n, self.alpha)? >= self.beta {
                    return Ok(k as usize);
                }
            }
        }
        Err(self.too_small(size))
    }

    /// Smallest `N` for which the order statistic `rank` places from the
    /// relevant end bounds the quantile with confidence `beta`.
    pub fn unilateral_minimum_sample_size(&self, rank: usize, tail: bool) -> Result<usize> {
        // Probability that a point falls on the bounding side.
        let a = if tail { self.alpha } else { 1.0 - self.alpha };
        let r = rank as f64;
        let beta = self.beta;

        // P(Binom(n, a) >= rank + 1) - beta, continuous and increasing in n.
        let excess =
            |n: f64| -> Result<f64> { Ok(1.0 - binomial::cdf_continuous(r, n, a)? - beta) };
        let discrete = |n: u64| -> Result<bool> {
            Ok(binomial::sf_inclusive(rank as u64 + 1, n, a)? >= beta)
        };

        let lo = r + 1.0;
        let f_lo = excess(lo)?;
        let mut n = if f_lo >= 0.0 {
            rank as u64 + 1
        } else {
            let mut hi = 2.0 * lo;
            let mut f_hi = excess(hi)?;
            while f_hi < 0.0 {
                if hi > 1e15 {
                    return Err(Error::Computation(format!(
                        "no sample size reaches confidence {} for rank {}",
                        beta, rank
                    )));
                }
                hi *= 2.0;
                f_hi = excess(hi)?;
            }
            let root = Brent::default().solve(excess, lo, hi, f_lo, f_hi)?;
            root.ceil().max(lo) as u64
        };
        // Brent stops within its tolerance; settle on the exact integer.
        while !discrete(n)? {
            n += 1;
        }
        while n > rank as u64 + 1 && discrete(n - 1)? {
            n -= 1;
        }
        Ok(n as usize)
    }

    /// Tightest `(k1, k2)`, `k1 < k2`, with `P(X_(k1) <= x_alpha <= X_(k2)) >= beta`.
    ///
    /// Two-pointer scan over the breakpoints of the `Binom(size, alpha)` CDF;
    /// ties in width are broken by the larger coverage.
    pub fn bilateral_rank(&self, size: usize) -> Result<(usize, usize)> {
        let (k1, k2, _) = self.bilateral_rank_with_coverage(size)?;
        Ok((k1, k2))
    }

    fn bilateral_rank_with_coverage(&self, size: usize) -> Result<(usize, usize, f64)> {
        check_size(size)?;
        let n = size as u64;
        let cdf: Vec<f64> = (0..n).map(|k| binomial::cdf(k, n, self.alpha)).collect::<Result<_>>()?;

        let mut best: Option<(usize, usize, f64)> = None;
        let mut k2 = 1;
        for k1 in 0..size.saturating_sub(1) {
            k2 = k2.max(k1 + 1);
            while k2 < size && cdf[k2] - cdf[k1] < self.beta {
                k2 += 1;
            }
            if k2 == size {
                break;
            }
            let coverage = cdf[k2] - cdf[k1];
            let better = match best {
                None => true,
                Some((b1, b2, bc)) => k2 - k1 < b2 - b1 || (k2 - k1 == b2 - b1 && coverage > bc),
            };
            if better {
                best = Some((k1, k2, coverage));
            }
        }
        best.ok_or_else(|| self.too_small(size))
    }

    /// Smallest `N` such that `[X_(0), X_(N-1)]` covers `x_alpha` with confidence `beta`:
    /// `1 - alpha^N - (1 - alpha)^N >= beta`.
    pub fn bilateral_minimum_sample_size(&self) -> Result<usize> {
        let ok = |n: u64| {
            1.0 - self.alpha.powf(n as f64) - (1.0 - self.alpha).powf(n as f64) >= self.beta
        };
        let mut hi: u64 = 2;
        while !ok(hi) {
            if hi > 1 << 50 {
                return Err(Error::Computation(format!(
                    "no sample size reaches bilateral confidence {}",
                    self.beta
                )));
            }
            hi *= 2;
        }
        let mut lo = hi / 2;
        if lo < 2 {
            return Ok(hi as usize);
        }
        // ok(lo) is false, ok(hi) is true.
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if ok(mid) {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Ok(hi as usize)
    }

    /// Normal approximation of the bilateral ranks, for large samples.
    pub fn asymptotic_bilateral_rank(&self, size: usize) -> Result<(usize, usize)> {
        check_size(size)?;
        let n = size as f64;
        let z = std_normal_quantile(0.5 + 0.5 * self.beta);
        let s = (n * self.alpha * (1.0 - self.alpha)).sqrt();
        let k1 = (n * self.alpha - z * s).floor().max(0.0) as usize;
        let k2 = ((n * self.alpha + z * s).ceil() as usize).min(size - 1);
        Ok((k1, k2))
    }

    /// One-sided bound of the quantile from a sample.
    pub fn unilateral_interval(&self, sample: &[f64], tail: bool) -> Result<f64> {
        Ok(self.unilateral_interval_with_coverage(sample, tail)?.0)
    }

    /// One-sided bound and its exact coverage.
    pub fn unilateral_interval_with_coverage(
        &self,
        sample: &[f64],
        tail: bool,
    ) -> Result<(f64, f64)> {
        let sorted = sorted_copy(sample)?;
        let n = sorted.len() as u64;
        let k = self.unilateral_rank(sorted.len(), tail)?;
        let coverage = if tail {
            binomial::sf_inclusive(k as u64 + 1, n, self.alpha)?
        } else {
            binomial::cdf(k as u64, n, self.alpha)?
        };
        Ok((sorted[k], coverage))
    }

    /// Two-sided interval of the quantile from a sample.
    pub fn bilateral_interval(&self, sample: &[f64]) -> Result<(f64, f64)> {
        Ok(self.bilateral_interval_with_coverage(sample)?.0)
    }

    /// Two-sided interval and its exact coverage.
    pub fn bilateral_interval_with_coverage(&self, sample: &[f64]) -> Result<((f64, f64), f64)> {
        let sorted = sorted_copy(sample)?;
        let (k1, k2, coverage) = self.bilateral_rank_with_coverage(sorted.len())?;
        Ok(((sorted[k1], sorted[k2]), coverage))
    }

    fn too_small(&self, size: usize) -> Error {
        Error::Validation(format!(
            "sample of size {} is too small to bound the {}-quantile with confidence {}",
            size, self.alpha, self.beta
        ))
    }
}

/// Classical Wilks formulae: upper bounds of a quantile.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wilks;

impl Wilks {
    /// Minimum size such that the `margin`-th largest value (0 = maximum) bounds the
    /// `level`-quantile from above with probability `confidence`.
    pub fn compute_sample_size(level: f64, confidence: f64, margin: usize) -> Result<usize> {
        QuantileConfidence::new(level, confidence)?.unilateral_minimum_sample_size(margin, false)
    }

    /// The `margin`-th largest value of `sample`, after checking the sample is large enough.
    pub fn compute_quantile_bound(
        level: f64,
        confidence: f64,
        sample: &[f64],
        margin: usize,
    ) -> Result<f64> {
        let needed = Self::compute_sample_size(level, confidence, margin)?;
        if sample.len() < needed {
            return Err(Error::Validation(format!(
                "Wilks bound at level {} / confidence {} with margin {} needs {} points, got {}",
                level,
                confidence,
                margin,
                needed,
                sample.len()
            )));
        }
        let sorted = sorted_copy(sample)?;
        Ok(sorted[sorted.len() - 1 - margin])
    }
}

fn check_level(name: &str, v: f64) -> Result<()> {
    if !(v > 0.0 && v < 1.0) {
        return Err(Error::Validation(format!("{} must be in (0, 1), got {}", name, v)));
    }
    Ok(())
}

fn check_size(size: usize) -> Result<()> {
    if size == 0 {
        return Err(Error::Validation("sample size must be > 0".into()));
    }
    Ok(())
}

fn sorted_copy(sample: &[f64]) -> Result<Vec<f64>> {
    if sample.is_empty() {
        return Err(Error::Validation("sample must be non-empty".into()));
    }
    if sample.iter().any(|v| v.is_nan()) {
        return Err(Error::Validation("sample contains NaN".into()));
    }
    let mut v = sample.to_vec();
    v.sort_by(f64::total_cmp);
    Ok(v)
}

//! Binomial law `Binom(n, p)`.
//!
//! The CDF goes through the regularized incomplete beta function, which also
//! gives a continuous extension in `n` used by order-statistics sample sizing:
//! `P(X <= k) = I_{1-p}(n - k, k + 1)`.

use ns_core::{Error, Result};
use statrs::function::beta::beta_reg;
use statrs::function::factorial::ln_binomial;

fn check_p(p: f64) -> Result<()> {
    if !p.is_finite() || !(0.0..=1.0).contains(&p) {
        return Err(Error::Validation(format!("p must be finite and in [0,1], got {}", p)));
    }
    Ok(())
}

/// `ln P(X = k)`; the degenerate laws `p = 0` and `p = 1` put all mass on `0` or `n`.
pub fn logpmf(k: u64, n: u64, p: f64) -> Result<f64> {
    check_p(p)?;
    if k > n {
        return Err(Error::Validation(format!("count {} exceeds the number of trials {}", k, n)));
    }
    let degenerate = if p == 0.0 {
        Some(k == 0)
    } else if p == 1.0 {
        Some(k == n)
    } else {
        None
    };
    if let Some(at_mass) = degenerate {
        return Ok(if at_mass { 0.0 } else { f64::NEG_INFINITY });
    }
    Ok(ln_binomial(n, k) + k as f64 * p.ln() + (n - k) as f64 * (-p).ln_1p())
}

/// `P(X <= k)` for `X ~ Binom(n, p)`.
pub fn cdf(k: u64, n: u64, p: f64) -> Result<f64> {
    check_p(p)?;
    if k >= n {
        return Ok(1.0);
    }
    cdf_continuous(k as f64, n as f64, p)
}

/// `P(X >= k)` for `X ~ Binom(n, p)`.
pub fn sf_inclusive(k: u64, n: u64, p: f64) -> Result<f64> {
    if k == 0 {
        check_p(p)?;
        return Ok(1.0);
    }
    Ok(1.0 - cdf(k - 1, n, p)?)
}

/// `P(X <= k)` extended to a real number of trials `n > k`.
///
/// Monotone decreasing in `n`, which makes it suitable for root finding on the
/// minimum sample size of an order-statistic bound.
pub fn cdf_continuous(k: f64, n: f64, p: f64) -> Result<f64> {
    check_p(p)?;
    if !k.is_finite() || k < 0.0 {
        return Err(Error::Validation(format!("k must be finite and >= 0, got {}", k)));
    }
    if !n.is_finite() {
        return Err(Error::Validation(format!("n must be finite, got {}", n)));
    }
    if n <= k {
        return Ok(1.0);
    }
    if p == 0.0 {
        return Ok(1.0);
    }
    if p == 1.0 {
        return Ok(0.0);
    }
    Ok(beta_reg(n - k, k + 1.0, 1.0 - p))
}

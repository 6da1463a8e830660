//! Exponential distribution utilities.

use ns_core::{Error, Result};

fn check_rate(rate: f64) -> Result<()> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(Error::Validation(format!("rate must be finite and > 0, got {}", rate)));
    }
    Ok(())
}

/// Log-PDF of an Exponential distribution at `x` with rate `rate`.
///
/// Support: `x >= 0`.
pub fn logpdf(x: f64, rate: f64) -> Result<f64> {
    check_rate(rate)?;
    if x < 0.0 {
        return Ok(f64::NEG_INFINITY);
    }
    Ok(rate.ln() - rate * x)
}

/// CDF `1 - exp(-rate x)`, computed with `exp_m1` near the origin.
pub fn cdf(x: f64, rate: f64) -> Result<f64> {
    check_rate(rate)?;
    if x <= 0.0 {
        return Ok(0.0);
    }
    Ok(-(-rate * x).exp_m1())
}

/// Survival function `exp(-rate x)`.
pub fn sf(x: f64, rate: f64) -> Result<f64> {
    check_rate(rate)?;
    if x <= 0.0 {
        return Ok(1.0);
    }
    Ok((-rate * x).exp())
}

/// Quantile at probability `p`.
pub fn quantile(p: f64, rate: f64) -> Result<f64> {
    check_rate(rate)?;
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::Validation(format!("p must be in [0,1], got {}", p)));
    }
    Ok(-(-p).ln_1p() / rate)
}

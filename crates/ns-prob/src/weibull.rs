//! Scalar Weibull law with shape `k` and scale `lambda`.

use ns_core::{Error, Result};

fn check_params(shape: f64, scale: f64) -> Result<()> {
    if !shape.is_finite() || shape <= 0.0 {
        return Err(Error::Validation(format!(
            "Weibull shape must be finite and > 0, got {}",
            shape
        )));
    }
    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::Validation(format!(
            "Weibull scale must be finite and > 0, got {}",
            scale
        )));
    }
    Ok(())
}

/// Log-PDF at `x`: `ln(k / lambda) + (k - 1) ln(x / lambda) - (x / lambda)^k`.
///
/// Support: `x >= 0`. At the origin the density is infinite for `k < 1`, zero
/// for `k > 1` and `1 / lambda` for `k = 1`.
pub fn logpdf(x: f64, shape: f64, scale: f64) -> Result<f64> {
    check_params(shape, scale)?;
    if x < 0.0 {
        return Ok(f64::NEG_INFINITY);
    }
    if x == 0.0 {
        return Ok(match shape.partial_cmp(&1.0) {
            Some(std::cmp::Ordering::Less) => f64::INFINITY,
            Some(std::cmp::Ordering::Greater) => f64::NEG_INFINITY,
            _ => -scale.ln(),
        });
    }
    let z = x / scale;
    Ok((shape / scale).ln() + (shape - 1.0) * z.ln() - z.powf(shape))
}

/// CDF `1 - exp(-(x / lambda)^k)`.
pub fn cdf(x: f64, shape: f64, scale: f64) -> Result<f64> {
    check_params(shape, scale)?;
    if x <= 0.0 {
        return Ok(0.0);
    }
    Ok(-(-(x / scale).powf(shape)).exp_m1())
}

/// Survival function `exp(-(x / lambda)^k)`.
pub fn sf(x: f64, shape: f64, scale: f64) -> Result<f64> {
    check_params(shape, scale)?;
    if x <= 0.0 {
        return Ok(1.0);
    }
    Ok((-(x / scale).powf(shape)).exp())
}

/// Quantile `lambda (-ln(1 - p))^(1/k)`.
pub fn quantile(p: f64, shape: f64, scale: f64) -> Result<f64> {
    check_params(shape, scale)?;
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::Validation(format!("p must be in [0,1], got {}", p)));
    }
    Ok(scale * (-(-p).ln_1p()).powf(1.0 / shape))
}

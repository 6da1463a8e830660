//! Small numerically-stable math utilities used across probability code.

use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::SQRT_2;

/// Natural log of `sqrt(2π)`.
pub const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Stable `log(Σ exp(x_i))`.
///
/// Returns `-inf` for an empty slice or when every term is `-inf`.
pub fn log_sum_exp(xs: &[f64]) -> f64 {
    let m = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !m.is_finite() {
        return m;
    }
    let s: f64 = xs.iter().map(|&x| (x - m).exp()).sum();
    m + s.ln()
}

/// Standard Normal CDF `Φ(z)`.
///
/// Uses `erfc` on both sides so the lower tail keeps full relative accuracy.
#[inline]
pub fn std_normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / SQRT_2)
}

/// Standard Normal survival function `1 - Φ(z)`.
#[inline]
pub fn std_normal_sf(z: f64) -> f64 {
    0.5 * erfc(z / SQRT_2)
}

/// Standard Normal quantile `Φ⁻¹(p)`.
///
/// `p = 0` maps to `-inf`, `p = 1` to `+inf`, anything outside `[0, 1]` to `NaN`.
#[inline]
pub fn std_normal_quantile(p: f64) -> f64 {
    if !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }
    -SQRT_2 * erfc_inv(2.0 * p)
}

/// Log-density of the standard Normal at `z`.
#[inline]
pub fn std_normal_logpdf(z: f64) -> f64 {
    -0.5 * z * z - LN_SQRT_2PI
}

//! One-dimensional continuous marginals.
//!
//! A [`Marginal`] is plain data (serde-tagged by `type`) so study files can
//! declare input laws directly. Parameters are validated once on construction
//! ([`Marginal::validate`]); evaluation methods then never fail.

use std::sync::Arc;

use ns_core::{Error, Result, Sample};
use rand::{Rng, RngCore};
use rand_distr::{Distribution as _, Open01, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::distribution::{Distribution, check_parameter_count};
use crate::math::{std_normal_cdf, std_normal_quantile, std_normal_sf};

/// A one-dimensional continuous law.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Marginal {
    /// `N(mu, sigma)`.
    Normal {
        /// Mean.
        mu: f64,
        /// Standard deviation.
        sigma: f64,
    },
    /// `exp(N(mu_log, sigma_log))`.
    LogNormal {
        /// Mean of `ln X`.
        mu_log: f64,
        /// Standard deviation of `ln X`.
        sigma_log: f64,
    },
    /// Uniform on `[a, b]`.
    Uniform {
        /// Lower bound.
        a: f64,
        /// Upper bound.
        b: f64,
    },
    /// Exponential with rate `rate`, support `[0, inf)`.
    Exponential {
        /// Rate.
        rate: f64,
    },
    /// Weibull with shape `shape` and scale `scale`.
    Weibull {
        /// Shape `k`.
        shape: f64,
        /// Scale `lambda`.
        scale: f64,
    },
}

fn positive(name: &str, v: f64) -> Result<()> {
    if !v.is_finite() || v <= 0.0 {
        return Err(Error::Validation(format!("{} must be finite and > 0, got {}", name, v)));
    }
    Ok(())
}

fn finite(name: &str, v: f64) -> Result<()> {
    if !v.is_finite() {
        return Err(Error::Validation(format!("{} must be finite, got {}", name, v)));
    }
    Ok(())
}

impl Marginal {
    /// Validated Normal marginal.
    pub fn normal(mu: f64, sigma: f64) -> Result<Self> {
        Self::Normal { mu, sigma }.validated()
    }

    /// Validated LogNormal marginal.
    pub fn log_normal(mu_log: f64, sigma_log: f64) -> Result<Self> {
        Self::LogNormal { mu_log, sigma_log }.validated()
    }

    /// Validated Uniform marginal.
    pub fn uniform(a: f64, b: f64) -> Result<Self> {
        Self::Uniform { a, b }.validated()
    }

    /// Validated Exponential marginal.
    pub fn exponential(rate: f64) -> Result<Self> {
        Self::Exponential { rate }.validated()
    }

    /// Validated Weibull marginal.
    pub fn weibull(shape: f64, scale: f64) -> Result<Self> {
        Self::Weibull { shape, scale }.validated()
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Check parameters. Deserialized marginals must be validated before use.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Marginal::Normal { mu, sigma } => {
                finite("mu", mu)?;
                positive("sigma", sigma)
            }
            Marginal::LogNormal { mu_log, sigma_log } => {
                finite("mu_log", mu_log)?;
                positive("sigma_log", sigma_log)
            }
            Marginal::Uniform { a, b } => {
                finite("a", a)?;
                finite("b", b)?;
                if a >= b {
                    return Err(Error::Validation(format!(
                        "uniform requires a < b, got a={} b={}",
                        a, b
                    )));
                }
                Ok(())
            }
            Marginal::Exponential { rate } => positive("rate", rate),
            Marginal::Weibull { shape, scale } => {
                positive("shape", shape)?;
                positive("scale", scale)
            }
        }
    }

    /// Log-density at `x`.
    pub fn log_pdf_at(&self, x: f64) -> f64 {
        let lp = match *self {
            Marginal::Normal { mu, sigma } => crate::normal::logpdf(x, mu, sigma),
            Marginal::LogNormal { mu_log, sigma_log } => {
                if x <= 0.0 {
                    return f64::NEG_INFINITY;
                }
                let lx = x.ln();
                crate::normal::logpdf(lx, mu_log, sigma_log).map(|lp| lp - lx)
            }
            Marginal::Uniform { a, b } => {
                return if (a..=b).contains(&x) { -(b - a).ln() } else { f64::NEG_INFINITY };
            }
            Marginal::Exponential { rate } => crate::exponential::logpdf(x, rate),
            Marginal::Weibull { shape, scale } => crate::weibull::logpdf(x, shape, scale),
        };
        lp.unwrap_or(f64::NAN)
    }

    /// `P(X <= x)`.
    pub fn cdf(&self, x: f64) -> f64 {
        match *self {
            Marginal::Normal { mu, sigma } => std_normal_cdf((x - mu) / sigma),
            Marginal::LogNormal { mu_log, sigma_log } => {
                if x <= 0.0 { 0.0 } else { std_normal_cdf((x.ln() - mu_log) / sigma_log) }
            }
            Marginal::Uniform { a, b } => ((x - a) / (b - a)).clamp(0.0, 1.0),
            Marginal::Exponential { rate } => crate::exponential::cdf(x, rate).unwrap_or(f64::NAN),
            Marginal::Weibull { shape, scale } => {
                crate::weibull::cdf(x, shape, scale).unwrap_or(f64::NAN)
            }
        }
    }

    /// `P(X > x)`, accurate in the upper tail.
    pub fn sf(&self, x: f64) -> f64 {
        match *self {
            Marginal::Normal { mu, sigma } => std_normal_sf((x - mu) / sigma),
            Marginal::LogNormal { mu_log, sigma_log } => {
                if x <= 0.0 { 1.0 } else { std_normal_sf((x.ln() - mu_log) / sigma_log) }
            }
            Marginal::Uniform { a, b } => ((b - x) / (b - a)).clamp(0.0, 1.0),
            Marginal::Exponential { rate } => crate::exponential::sf(x, rate).unwrap_or(f64::NAN),
            Marginal::Weibull { shape, scale } => {
                crate::weibull::sf(x, shape, scale).unwrap_or(f64::NAN)
            }
        }
    }

    /// Quantile `F^{-1}(p)` for `p` in `[0, 1]`.
    pub fn quantile(&self, p: f64) -> f64 {
        match *self {
            Marginal::Normal { mu, sigma } => mu + sigma * std_normal_quantile(p),
            Marginal::LogNormal { mu_log, sigma_log } => {
                (mu_log + sigma_log * std_normal_quantile(p)).exp()
            }
            Marginal::Uniform { a, b } => a + p * (b - a),
            Marginal::Exponential { rate } => {
                crate::exponential::quantile(p, rate).unwrap_or(f64::NAN)
            }
            Marginal::Weibull { shape, scale } => {
                crate::weibull::quantile(p, shape, scale).unwrap_or(f64::NAN)
            }
        }
    }

    /// Upper-tail quantile: the `x` with `P(X > x) = q`.
    pub fn inverse_sf(&self, q: f64) -> f64 {
        match *self {
            Marginal::Normal { mu, sigma } => mu - sigma * std_normal_quantile(q),
            Marginal::LogNormal { mu_log, sigma_log } => {
                (mu_log - sigma_log * std_normal_quantile(q)).exp()
            }
            Marginal::Uniform { a, b } => b - q * (b - a),
            Marginal::Exponential { rate } => -q.ln() / rate,
            Marginal::Weibull { shape, scale } => scale * (-q.ln()).powf(1.0 / shape),
        }
    }

    /// Map `x` to the standard Normal space: `u = Φ⁻¹(F(x))`.
    ///
    /// Works on whichever tail is smaller so both tails keep relative precision.
    pub fn to_standard_value(&self, x: f64) -> f64 {
        if let Marginal::Normal { mu, sigma } = *self {
            return (x - mu) / sigma;
        }
        let p = self.cdf(x);
        if p <= 0.5 { std_normal_quantile(p) } else { -std_normal_quantile(self.sf(x)) }
    }

    /// Inverse of [`Marginal::to_standard_value`].
    pub fn from_standard_value(&self, u: f64) -> f64 {
        if let Marginal::Normal { mu, sigma } = *self {
            return mu + sigma * u;
        }
        if u <= 0.0 { self.quantile(std_normal_cdf(u)) } else { self.inverse_sf(std_normal_sf(u)) }
    }

    /// Draw one realization.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Marginal::Normal { mu, sigma } => {
                let z: f64 = StandardNormal.sample(rng);
                mu + sigma * z
            }
            Marginal::LogNormal { mu_log, sigma_log } => {
                let z: f64 = StandardNormal.sample(rng);
                (mu_log + sigma_log * z).exp()
            }
            _ => {
                let v: f64 = Open01.sample(rng);
                self.quantile(v)
            }
        }
    }

    /// Parameter values, in declaration order.
    pub fn parameter_values(&self) -> Vec<f64> {
        match *self {
            Marginal::Normal { mu, sigma } => vec![mu, sigma],
            Marginal::LogNormal { mu_log, sigma_log } => vec![mu_log, sigma_log],
            Marginal::Uniform { a, b } => vec![a, b],
            Marginal::Exponential { rate } => vec![rate],
            Marginal::Weibull { shape, scale } => vec![shape, scale],
        }
    }

    /// Parameter names, in declaration order.
    pub fn parameter_labels(&self) -> &'static [&'static str] {
        match self {
            Marginal::Normal { .. } => &["mu", "sigma"],
            Marginal::LogNormal { .. } => &["mu_log", "sigma_log"],
            Marginal::Uniform { .. } => &["a", "b"],
            Marginal::Exponential { .. } => &["rate"],
            Marginal::Weibull { .. } => &["shape", "scale"],
        }
    }

    /// Same family, new parameters (validated).
    pub fn with_values(&self, p: &[f64]) -> Result<Marginal> {
        check_parameter_count(self.family(), self.parameter_labels().len(), p.len())?;
        let m = match self {
            Marginal::Normal { .. } => Marginal::Normal { mu: p[0], sigma: p[1] },
            Marginal::LogNormal { .. } => Marginal::LogNormal { mu_log: p[0], sigma_log: p[1] },
            Marginal::Uniform { .. } => Marginal::Uniform { a: p[0], b: p[1] },
            Marginal::Exponential { .. } => Marginal::Exponential { rate: p[0] },
            Marginal::Weibull { .. } => Marginal::Weibull { shape: p[0], scale: p[1] },
        };
        m.validated()
    }

    /// Family name.
    pub fn family(&self) -> &'static str {
        match self {
            Marginal::Normal { .. } => "Normal",
            Marginal::LogNormal { .. } => "LogNormal",
            Marginal::Uniform { .. } => "Uniform",
            Marginal::Exponential { .. } => "Exponential",
            Marginal::Weibull { .. } => "Weibull",
        }
    }
}

impl Distribution for Marginal {
    fn dimension(&self) -> usize {
        1
    }

    fn sample(&self, rng: &mut dyn RngCore, size: usize) -> Sample {
        let mut out = Sample::with_capacity(1, size);
        for _ in 0..size {
            out.push(&[self.draw(rng)]);
        }
        out
    }

    fn log_pdf(&self, x: &[f64]) -> f64 {
        self.log_pdf_at(x[0])
    }

    fn parameters(&self) -> Vec<f64> {
        self.parameter_values()
    }

    fn parameter_names(&self) -> Vec<String> {
        self.parameter_labels().iter().map(|s| s.to_string()).collect()
    }

    fn with_parameters(&self, parameters: &[f64]) -> Result<Arc<dyn Distribution>> {
        Ok(Arc::new(self.with_values(parameters)?))
    }

    fn marginal(&self, index: usize) -> Result<Arc<dyn Distribution>> {
        if index != 0 {
            return Err(Error::Validation(format!(
                "marginal index {} out of range (dimension=1)",
                index
            )));
        }
        Ok(Arc::new(self.clone()))
    }

    fn to_standard(&self, x: &[f64]) -> Result<Vec<f64>> {
        Ok(vec![self.to_standard_value(x[0])])
    }

    fn from_standard(&self, u: &[f64]) -> Result<Vec<f64>> {
        Ok(vec![self.from_standard_value(u[0])])
    }

    fn from_unit_cube(&self, v: &[f64]) -> Result<Vec<f64>> {
        Ok(vec![self.quantile(v[0])])
    }

    fn name(&self) -> String {
        let args: Vec<String> = self
            .parameter_labels()
            .iter()
            .zip(self.parameter_values())
            .map(|(n, v)| format!("{}={}", n, v))
            .collect();
        format!("{}({})", self.family(), args.join(", "))
    }
}

//! Normal distribution utilities.
//!
//! Scalar helpers (`logpdf`, `cdf`, `quantile`) plus [`Normal`], an independent
//! multivariate Normal used as the standard space and as the auxiliary density of
//! standard-space cross-entropy and NAIS.

use std::sync::Arc;

use ns_core::{Error, Result, Sample};
use rand::RngCore;
use rand_distr::{Distribution as _, StandardNormal};

use crate::distribution::{Distribution, check_parameter_count};
use crate::math::{LN_SQRT_2PI, std_normal_cdf, std_normal_quantile};

fn check_sigma(sigma: f64) -> Result<()> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(Error::Validation(format!("sigma must be finite and > 0, got {}", sigma)));
    }
    Ok(())
}

/// Log-PDF of a Normal distribution `N(mu, sigma)` at `x`.
///
/// `log p(x) = -0.5 * ((x-mu)/sigma)^2 - ln(sigma) - ln(sqrt(2π))`
pub fn logpdf(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    check_sigma(sigma)?;
    let z = (x - mu) / sigma;
    Ok(-0.5 * z * z - sigma.ln() - LN_SQRT_2PI)
}

/// CDF of `N(mu, sigma)` at `x`.
pub fn cdf(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    check_sigma(sigma)?;
    Ok(std_normal_cdf((x - mu) / sigma))
}

/// Quantile of `N(mu, sigma)` at probability `p`.
pub fn quantile(p: f64, mu: f64, sigma: f64) -> Result<f64> {
    check_sigma(sigma)?;
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::Validation(format!("p must be in [0,1], got {}", p)));
    }
    Ok(mu + sigma * std_normal_quantile(p))
}

/// Independent multivariate Normal with per-component mean and standard deviation.
///
/// Parameters are laid out marginal by marginal: `[mu_0, sigma_0, mu_1, sigma_1, ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Normal {
    mean: Vec<f64>,
    sigma: Vec<f64>,
}

impl Normal {
    /// Create from means and standard deviations.
    pub fn new(mean: Vec<f64>, sigma: Vec<f64>) -> Result<Self> {
        if mean.is_empty() {
            return Err(Error::Validation("Normal dimension must be > 0".into()));
        }
        if mean.len() != sigma.len() {
            return Err(Error::Validation(format!(
                "mean/sigma length mismatch: {} != {}",
                mean.len(),
                sigma.len()
            )));
        }
        for &m in &mean {
            if !m.is_finite() {
                return Err(Error::Validation(format!("mean must be finite, got {}", m)));
            }
        }
        for &s in &sigma {
            check_sigma(s)?;
        }
        Ok(Self { mean, sigma })
    }

    /// Standard Normal `N(0, I)` of dimension `dimension`.
    pub fn standard(dimension: usize) -> Result<Self> {
        Self::new(vec![0.0; dimension], vec![1.0; dimension])
    }

    /// Component means.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Component standard deviations.
    pub fn sigma(&self) -> &[f64] {
        &self.sigma
    }
}

impl Distribution for Normal {
    fn dimension(&self) -> usize {
        self.mean.len()
    }

    fn sample(&self, rng: &mut dyn RngCore, size: usize) -> Sample {
        let d = self.dimension();
        let mut out = Sample::with_capacity(d, size);
        let mut point = vec![0.0; d];
        for _ in 0..size {
            for (k, x) in point.iter_mut().enumerate() {
                let z: f64 = StandardNormal.sample(rng);
                *x = self.mean[k] + self.sigma[k] * z;
            }
            out.push(&point);
        }
        out
    }

    fn log_pdf(&self, x: &[f64]) -> f64 {
        let mut lp = 0.0;
        for (k, &xk) in x.iter().enumerate() {
            let z = (xk - self.mean[k]) / self.sigma[k];
            lp += -0.5 * z * z - self.sigma[k].ln() - LN_SQRT_2PI;
        }
        lp
    }

    fn parameters(&self) -> Vec<f64> {
        self.mean.iter().zip(&self.sigma).flat_map(|(&m, &s)| [m, s]).collect()
    }

    fn parameter_names(&self) -> Vec<String> {
        (0..self.dimension()).flat_map(|k| [format!("mu_{k}"), format!("sigma_{k}")]).collect()
    }

    fn with_parameters(&self, parameters: &[f64]) -> Result<Arc<dyn Distribution>> {
        check_parameter_count("Normal", 2 * self.dimension(), parameters.len())?;
        let mean = parameters.iter().step_by(2).copied().collect();
        let sigma = parameters.iter().skip(1).step_by(2).copied().collect();
        Ok(Arc::new(Normal::new(mean, sigma)?))
    }

    fn marginal(&self, index: usize) -> Result<Arc<dyn Distribution>> {
        if index >= self.dimension() {
            return Err(Error::Validation(format!(
                "marginal index {} out of range (dimension={})",
                index,
                self.dimension()
            )));
        }
        Ok(Arc::new(Normal::new(vec![self.mean[index]], vec![self.sigma[index]])?))
    }

    fn to_standard(&self, x: &[f64]) -> Result<Vec<f64>> {
        Ok(x.iter().enumerate().map(|(k, &v)| (v - self.mean[k]) / self.sigma[k]).collect())
    }

    fn from_standard(&self, u: &[f64]) -> Result<Vec<f64>> {
        Ok(u.iter().enumerate().map(|(k, &v)| self.mean[k] + self.sigma[k] * v).collect())
    }

    fn from_unit_cube(&self, v: &[f64]) -> Result<Vec<f64>> {
        Ok(v.iter()
            .enumerate()
            .map(|(k, &p)| self.mean[k] + self.sigma[k] * std_normal_quantile(p))
            .collect())
    }

    fn name(&self) -> String {
        format!("Normal(dim={})", self.dimension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_standard_at_zero() {
        let lp = logpdf(0.0, 0.0, 1.0).unwrap();
        assert!((lp + LN_SQRT_2PI).abs() < 1e-12);
    }

    #[test]
    fn test_symmetry() {
        let lp1 = logpdf(1.3, 0.0, 2.0).unwrap();
        let lp2 = logpdf(-1.3, 0.0, 2.0).unwrap();
        assert!((lp1 - lp2).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_sigma() {
        assert!(logpdf(0.0, 0.0, 0.0).is_err());
        assert!(logpdf(0.0, 0.0, -1.0).is_err());
        assert!(Normal::new(vec![0.0], vec![0.0]).is_err());
        assert!(Normal::new(vec![0.0, 1.0], vec![1.0]).is_err());
    }

    #[test]
    fn test_cdf_quantile_roundtrip() {
        let x = quantile(0.975, 1.0, 2.0).unwrap();
        assert_relative_eq!(cdf(x, 1.0, 2.0).unwrap(), 0.975, epsilon = 1e-12);
    }

    #[test]
    fn test_multivariate_logpdf_is_sum_of_marginals() {
        let n = Normal::new(vec![1.0, -2.0], vec![0.5, 3.0]).unwrap();
        let x = [0.3, 1.1];
        let expected = logpdf(0.3, 1.0, 0.5).unwrap() + logpdf(1.1, -2.0, 3.0).unwrap();
        assert_relative_eq!(n.log_pdf(&x), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_parameters_roundtrip() {
        let n = Normal::new(vec![1.0, -2.0], vec![0.5, 3.0]).unwrap();
        assert_eq!(n.parameters(), vec![1.0, 0.5, -2.0, 3.0]);
        let m = n.with_parameters(&[0.0, 1.0, 0.0, 2.0]).unwrap();
        assert_eq!(m.parameters(), vec![0.0, 1.0, 0.0, 2.0]);
        assert!(n.with_parameters(&[0.0, 1.0]).is_err());
        assert!(n.with_parameters(&[0.0, -1.0, 0.0, 1.0]).is_err());
    }

    #[test]
    fn test_sample_moments() {
        let n = Normal::new(vec![2.0], vec![0.5]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let s = n.sample(&mut rng, 20_000);
        let m = s.mean()[0];
        assert!((m - 2.0).abs() < 0.02, "mean={}", m);
    }

    #[test]
    fn test_standard_transform_roundtrip() {
        let n = Normal::new(vec![1.0, -2.0], vec![0.5, 3.0]).unwrap();
        let u = n.to_standard(&[1.5, 1.0]).unwrap();
        assert_relative_eq!(u[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(u[1], 1.0, epsilon = 1e-12);
        let x = n.from_standard(&u).unwrap();
        assert_relative_eq!(x[0], 1.5, epsilon = 1e-12);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-12);
    }
}

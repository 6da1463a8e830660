//! Independent composition of one-dimensional marginals.

use std::sync::Arc;

use ns_core::{Error, Result, Sample};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::distribution::{Distribution, check_parameter_count};
use crate::marginal::Marginal;

/// Product of independent [`Marginal`]s (independent copula).
///
/// The iso-probabilistic transform is the component-wise Nataf map
/// `u_i = Φ⁻¹(F_i(x_i))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedDistribution {
    marginals: Vec<Marginal>,
}

impl ComposedDistribution {
    /// Compose the given marginals. Each one is validated.
    pub fn new(marginals: Vec<Marginal>) -> Result<Self> {
        if marginals.is_empty() {
            return Err(Error::Validation(
                "ComposedDistribution needs at least one marginal".into(),
            ));
        }
        for m in &marginals {
            m.validate()?;
        }
        Ok(Self { marginals })
    }

    /// The marginals, in coordinate order.
    pub fn marginals(&self) -> &[Marginal] {
        &self.marginals
    }
}

impl Distribution for ComposedDistribution {
    fn dimension(&self) -> usize {
        self.marginals.len()
    }

    fn sample(&self, rng: &mut dyn RngCore, size: usize) -> Sample {
        let mut out = Sample::with_capacity(self.dimension(), size);
        let mut point = vec![0.0; self.dimension()];
        for _ in 0..size {
            for (x, m) in point.iter_mut().zip(&self.marginals) {
                *x = m.draw(rng);
            }
            out.push(&point);
        }
        out
    }

    fn log_pdf(&self, x: &[f64]) -> f64 {
        self.marginals.iter().zip(x).map(|(m, &xi)| m.log_pdf_at(xi)).sum()
    }

    fn parameters(&self) -> Vec<f64> {
        self.marginals.iter().flat_map(|m| m.parameter_values()).collect()
    }

    fn parameter_names(&self) -> Vec<String> {
        self.marginals
            .iter()
            .enumerate()
            .flat_map(|(k, m)| m.parameter_labels().iter().map(move |n| format!("x{}.{}", k, n)))
            .collect()
    }

    fn with_parameters(&self, parameters: &[f64]) -> Result<Arc<dyn Distribution>> {
        let expected: usize = self.marginals.iter().map(|m| m.parameter_labels().len()).sum();
        check_parameter_count("ComposedDistribution", expected, parameters.len())?;
        let mut offset = 0;
        let mut marginals = Vec::with_capacity(self.marginals.len());
        for m in &self.marginals {
            let n = m.parameter_labels().len();
            marginals.push(m.with_values(&parameters[offset..offset + n])?);
            offset += n;
        }
        Ok(Arc::new(ComposedDistribution { marginals }))
    }

    fn marginal(&self, index: usize) -> Result<Arc<dyn Distribution>> {
        let m = self.marginals.get(index).ok_or_else(|| {
            Error::Validation(format!(
                "marginal index {} out of range (dimension={})",
                index,
                self.dimension()
            ))
        })?;
        Ok(Arc::new(m.clone()))
    }

    fn to_standard(&self, x: &[f64]) -> Result<Vec<f64>> {
        Ok(self.marginals.iter().zip(x).map(|(m, &xi)| m.to_standard_value(xi)).collect())
    }

    fn from_standard(&self, u: &[f64]) -> Result<Vec<f64>> {
        Ok(self.marginals.iter().zip(u).map(|(m, &ui)| m.from_standard_value(ui)).collect())
    }

    fn from_unit_cube(&self, v: &[f64]) -> Result<Vec<f64>> {
        Ok(self.marginals.iter().zip(v).map(|(m, &vi)| m.quantile(vi)).collect())
    }

    fn name(&self) -> String {
        let parts: Vec<String> = self.marginals.iter().map(|m| m.name()).collect();
        format!("Composed[{}]", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn dist() -> ComposedDistribution {
        ComposedDistribution::new(vec![
            Marginal::normal(0.0, 1.0).unwrap(),
            Marginal::log_normal(0.0, 0.5).unwrap(),
            Marginal::exponential(2.0).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_parameters_roundtrip_and_names() {
        let d = dist();
        let p = d.parameters();
        assert_eq!(p.len(), 5);
        assert_eq!(d.parameter_names()[2], "x1.mu_log");
        let e = d.with_parameters(&[1.0, 2.0, 0.0, 0.5, 3.0]).unwrap();
        assert_eq!(e.parameters(), vec![1.0, 2.0, 0.0, 0.5, 3.0]);
        assert!(d.with_parameters(&[1.0]).is_err());
        assert!(d.with_parameters(&[1.0, -2.0, 0.0, 0.5, 3.0]).is_err());
    }

    #[test]
    fn test_log_pdf_is_sum_of_marginals() {
        let d = dist();
        let x = [0.2, 1.3, 0.4];
        let expected: f64 = d.marginals().iter().zip(&x).map(|(m, &v)| m.log_pdf_at(v)).sum();
        assert_relative_eq!(d.log_pdf(&x), expected, epsilon = 1e-14);
    }

    #[test]
    fn test_standard_roundtrip() {
        let d = dist();
        let u = [-2.5, 0.3, 3.1];
        let x = d.from_standard(&u).unwrap();
        let back = d.to_standard(&x).unwrap();
        for (a, b) in u.iter().zip(&back) {
            assert_relative_eq!(a, b, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_marginal_access() {
        let d = dist();
        assert_eq!(d.marginal(2).unwrap().parameters(), vec![2.0]);
        assert!(d.marginal(3).is_err());
        assert!(ComposedDistribution::new(vec![]).is_err());
    }
}

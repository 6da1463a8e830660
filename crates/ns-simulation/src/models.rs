//! Reference limit states with known failure probabilities.

use std::sync::Arc;

use ns_core::{Error, Model, Result};
use serde::{Deserialize, Serialize};

fn check_point(name: &str, dimension: usize, point: &[f64]) -> Result<()> {
    if point.len() != dimension {
        return Err(Error::Validation(format!(
            "model '{}' expects dimension {}, got {}",
            name,
            dimension,
            point.len()
        )));
    }
    Ok(())
}

/// `g(x) = intercept + sum_i a_i x_i`.
///
/// With standard Normal inputs, `P(g < 0) = Phi(-intercept / |a|)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearModel {
    /// Build from coefficients and intercept.
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Result<Self> {
        if coefficients.is_empty() {
            return Err(Error::Validation("LinearModel needs at least one coefficient".into()));
        }
        if coefficients.iter().chain([&intercept]).any(|c| !c.is_finite()) {
            return Err(Error::Validation("LinearModel coefficients must be finite".into()));
        }
        Ok(Self { coefficients, intercept })
    }

    /// `beta - (x_1 + ... + x_d) / sqrt(d)`: reliability index `beta` in standard space.
    pub fn hyperplane(dimension: usize, beta: f64) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Validation("dimension must be > 0".into()));
        }
        let a = -1.0 / (dimension as f64).sqrt();
        Self::new(vec![a; dimension], beta)
    }

    /// Reliability index `intercept / |a|`.
    pub fn reliability_index(&self) -> f64 {
        self.intercept / self.coefficients.iter().map(|a| a * a).sum::<f64>().sqrt()
    }
}

impl Model for LinearModel {
    fn input_dimension(&self) -> usize {
        self.coefficients.len()
    }

    fn evaluate(&self, point: &[f64]) -> Result<f64> {
        check_point("linear", self.coefficients.len(), point)?;
        Ok(self.intercept + self.coefficients.iter().zip(point).map(|(a, x)| a * x).sum::<f64>())
    }

    fn name(&self) -> &str {
        "linear"
    }
}

/// `g(x) = constant + sum_i a_i x_i + sum_i b_i x_i^2`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticModel {
    constant: f64,
    linear: Vec<f64>,
    quadratic: Vec<f64>,
}

impl QuadraticModel {
    /// Build from the constant, linear and diagonal quadratic terms.
    pub fn new(constant: f64, linear: Vec<f64>, quadratic: Vec<f64>) -> Result<Self> {
        if linear.is_empty() || linear.len() != quadratic.len() {
            return Err(Error::Validation(format!(
                "QuadraticModel: {} linear and {} quadratic terms",
                linear.len(),
                quadratic.len()
            )));
        }
        if linear.iter().chain(&quadratic).chain([&constant]).any(|c| !c.is_finite()) {
            return Err(Error::Validation("QuadraticModel coefficients must be finite".into()));
        }
        Ok(Self { constant, linear, quadratic })
    }
}

impl Model for QuadraticModel {
    fn input_dimension(&self) -> usize {
        self.linear.len()
    }

    fn evaluate(&self, point: &[f64]) -> Result<f64> {
        check_point("quadratic", self.linear.len(), point)?;
        Ok(self.constant
            + point
                .iter()
                .zip(self.linear.iter().zip(&self.quadratic))
                .map(|(x, (a, b))| a * x + b * x * x)
                .sum::<f64>())
    }

    fn name(&self) -> &str {
        "quadratic"
    }
}

/// Two-dimensional series system with four branches:
///
/// ```text
/// g(x) = min(3 + 0.1 (x1 - x2)^2 - (x1 + x2) / sqrt(2),
///            3 + 0.1 (x1 - x2)^2 + (x1 + x2) / sqrt(2),
///            (x1 - x2) + k / sqrt(2),
///            (x2 - x1) + k / sqrt(2))
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FourBranchModel {
    k: f64,
}

impl FourBranchModel {
    /// Build with branch offset `k` (6 and 7 are the usual choices).
    pub fn new(k: f64) -> Result<Self> {
        if !k.is_finite() {
            return Err(Error::Validation(format!(
                "FourBranchModel offset must be finite, got {}",
                k
            )));
        }
        Ok(Self { k })
    }
}

impl Model for FourBranchModel {
    fn input_dimension(&self) -> usize {
        2
    }

    fn evaluate(&self, point: &[f64]) -> Result<f64> {
        check_point("four-branch", 2, point)?;
        let (x1, x2) = (point[0], point[1]);
        let s = std::f64::consts::FRAC_1_SQRT_2;
        let curved = 3.0 + 0.1 * (x1 - x2).powi(2);
        Ok([
            curved - (x1 + x2) * s,
            curved + (x1 + x2) * s,
            (x1 - x2) + self.k * s,
            (x2 - x1) + self.k * s,
        ]
        .into_iter()
        .fold(f64::INFINITY, f64::min))
    }

    fn name(&self) -> &str {
        "four-branch"
    }
}

/// Serializable model declaration for study files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSpec {
    /// [`LinearModel`].
    Linear {
        /// Coefficients `a_i`.
        coefficients: Vec<f64>,
        /// Intercept.
        intercept: f64,
    },
    /// [`LinearModel::hyperplane`].
    Hyperplane {
        /// Input dimension.
        dimension: usize,
        /// Reliability index.
        beta: f64,
    },
    /// [`QuadraticModel`].
    Quadratic {
        /// Constant term.
        constant: f64,
        /// Linear terms.
        linear: Vec<f64>,
        /// Diagonal quadratic terms.
        quadratic: Vec<f64>,
    },
    /// [`FourBranchModel`].
    FourBranch {
        /// Branch offset.
        k: f64,
    },
}

impl ModelSpec {
    /// Instantiate the declared model.
    pub fn build(&self) -> Result<Arc<dyn Model>> {
        Ok(match self {
            ModelSpec::Linear { coefficients, intercept } => {
                Arc::new(LinearModel::new(coefficients.clone(), *intercept)?)
            }
            ModelSpec::Hyperplane { dimension, beta } => {
                Arc::new(LinearModel::hyperplane(*dimension, *beta)?)
            }
            ModelSpec::Quadratic { constant, linear, quadratic } => {
                Arc::new(QuadraticModel::new(*constant, linear.clone(), quadratic.clone())?)
            }
            ModelSpec::FourBranch { k } => Arc::new(FourBranchModel::new(*k)?),
        })
    }
}

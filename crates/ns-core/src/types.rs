//! Common data types for NextStat

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A set of points of a fixed dimension, stored row-major.
///
/// This is the unit of exchange between distributions, models and samplers:
/// `sample.row(i)` is the `i`-th realization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    dimension: usize,
    data: Vec<f64>,
}

impl Sample {
    /// Create an empty sample of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension, data: Vec::new() }
    }

    /// Create an empty sample with room for `size` points.
    pub fn with_capacity(dimension: usize, size: usize) -> Self {
        Self { dimension, data: Vec::with_capacity(dimension * size) }
    }

    /// Build a sample from row-major flat data.
    pub fn from_flat(dimension: usize, data: Vec<f64>) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Validation("sample dimension must be > 0".into()));
        }
        if data.len() % dimension != 0 {
            return Err(Error::Validation(format!(
                "flat data length {} is not a multiple of dimension {}",
                data.len(),
                dimension
            )));
        }
        Ok(Self { dimension, data })
    }

    /// Build a sample from a list of points. All points must share a dimension.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let dimension = rows.first().map(|r| r.len()).unwrap_or(0);
        if dimension == 0 {
            return Err(Error::Validation("sample rows must be non-empty".into()));
        }
        let mut out = Self::with_capacity(dimension, rows.len());
        for (i, r) in rows.iter().enumerate() {
            if r.len() != dimension {
                return Err(Error::Validation(format!(
                    "row {} has dimension {} but expected {}",
                    i,
                    r.len(),
                    dimension
                )));
            }
            out.data.extend_from_slice(r);
        }
        Ok(out)
    }

    /// Point dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        if self.dimension == 0 { 0 } else { self.data.len() / self.dimension }
    }

    /// `true` if the sample holds no point.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The `i`-th point.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.dimension..(i + 1) * self.dimension]
    }

    /// Mutable access to the `i`-th point.
    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.dimension..(i + 1) * self.dimension]
    }

    /// Iterate over points in order.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.data.chunks_exact(self.dimension.max(1))
    }

    /// Append one point.
    pub fn push(&mut self, point: &[f64]) {
        debug_assert_eq!(point.len(), self.dimension, "point dimension mismatch");
        self.data.extend_from_slice(point);
    }

    /// Append all points of `other`.
    pub fn extend(&mut self, other: &Sample) -> Result<()> {
        if other.dimension != self.dimension {
            return Err(Error::Validation(format!(
                "cannot extend a sample of dimension {} with dimension {}",
                self.dimension, other.dimension
            )));
        }
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    /// Sub-sample made of the given point indices, in the given order.
    pub fn select(&self, indices: &[usize]) -> Sample {
        let mut out = Sample::with_capacity(self.dimension, indices.len());
        for &i in indices {
            out.push(self.row(i));
        }
        out
    }

    /// Row-major flat view.
    pub fn as_flat(&self) -> &[f64] {
        &self.data
    }

    /// Consume into row-major flat data.
    pub fn into_flat(self) -> Vec<f64> {
        self.data
    }

    /// Component-wise mean. Empty samples yield `NaN` components.
    pub fn mean(&self) -> Vec<f64> {
        let n = self.len();
        let mut m = vec![0.0; self.dimension];
        for r in self.rows() {
            for (acc, &x) in m.iter_mut().zip(r) {
                *acc += x;
            }
        }
        m.iter_mut().for_each(|v| *v /= n as f64);
        m
    }
}

/// Comparison operator of a threshold event `g(X) op threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    /// `value < threshold`
    Less,
    /// `value <= threshold`
    LessOrEqual,
    /// `value > threshold`
    Greater,
    /// `value >= threshold`
    GreaterOrEqual,
}

impl ComparisonOperator {
    /// Apply the operator.
    #[inline]
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::Less => value < threshold,
            ComparisonOperator::LessOrEqual => value <= threshold,
            ComparisonOperator::Greater => value > threshold,
            ComparisonOperator::GreaterOrEqual => value >= threshold,
        }
    }

    /// `true` when the event lives in the lower tail of the output (`<`, `<=`).
    #[inline]
    pub fn is_lower_tail(self) -> bool {
        matches!(self, ComparisonOperator::Less | ComparisonOperator::LessOrEqual)
    }

    /// Short symbol, used in logs.
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Less => "<",
            ComparisonOperator::LessOrEqual => "<=",
            ComparisonOperator::Greater => ">",
            ComparisonOperator::GreaterOrEqual => ">=",
        }
    }
}

/// A scalar that may not have been computed yet, or that cannot be computed.
///
/// Distinguishes "no estimate exists yet" from "an estimate exists but this
/// derived quantity is undefinable for it" (e.g. a coefficient of variation of a
/// zero probability estimate).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum DerivedValue {
    /// Not computed yet.
    Pending,
    /// Computed value.
    Defined(f64),
    /// Provably undefinable for the current estimate.
    Undefinable,
}

impl DerivedValue {
    /// The value if defined.
    pub fn value(self) -> Option<f64> {
        match self {
            DerivedValue::Defined(v) => Some(v),
            _ => None,
        }
    }

    /// `true` if a value is available.
    pub fn is_defined(self) -> bool {
        matches!(self, DerivedValue::Defined(_))
    }
}

//! Streaming mean/variance over equally sized blocks.
//!
//! Blocks are combined with the pairwise update
//!
//! ```text
//! S_(k+1)p = (S_p + k S_kp) / (k+1) + k (M_kp - M_p)^2 / (k+1)^2
//! M_(k+1)p = (M_p + k M_kp) / (k+1)
//! ```
//!
//! where `M`/`S` are population mean/variance over the `kp` values seen so far and
//! over the new block. No running sum of squares is ever formed, so accuracy does
//! not degrade as the number of blocks grows.

use ns_core::DerivedValue;
use serde::{Deserialize, Serialize};

/// Frozen state of a [`RunningEstimator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunningEstimate {
    /// Probability (or mean) estimate.
    pub mean: f64,
    /// Variance of the estimator: population variance of the values over their count.
    pub variance: f64,
    /// Number of blocks folded so far.
    pub outer_sampling: usize,
    /// Values per block.
    pub block_size: usize,
}

impl RunningEstimate {
    /// Standard deviation of the estimator.
    pub fn standard_deviation(&self) -> DerivedValue {
        if self.outer_sampling == 0 {
            DerivedValue::Pending
        } else {
            DerivedValue::Defined(self.variance.max(0.0).sqrt())
        }
    }

    /// `sd / |mean|`. Undefinable for a zero estimate.
    pub fn coefficient_of_variation(&self) -> DerivedValue {
        if self.outer_sampling == 0 {
            return DerivedValue::Pending;
        }
        if self.mean == 0.0 || !self.mean.is_finite() {
            return DerivedValue::Undefinable;
        }
        DerivedValue::Defined(self.variance.max(0.0).sqrt() / self.mean.abs())
    }
}

/// Incremental combination of block statistics.
#[derive(Debug, Clone)]
pub struct RunningEstimator {
    block_size: usize,
    blocks: usize,
    mean: f64,
    population_variance: f64,
}

impl RunningEstimator {
    /// Empty estimator for blocks of `block_size` values.
    pub fn new(block_size: usize) -> Self {
        Self { block_size, blocks: 0, mean: 0.0, population_variance: 0.0 }
    }

    /// Fold one block given its own mean and population variance.
    pub fn update_with_stats(&mut self, block_mean: f64, block_variance: f64) {
        if self.blocks == 0 {
            self.mean = block_mean;
            self.population_variance = block_variance;
            self.blocks = 1;
            return;
        }
        let k = self.blocks as f64;
        let k1 = k + 1.0;
        let delta = self.mean - block_mean;
        self.population_variance =
            ((block_variance + k * self.population_variance) / k1 + k * delta * delta / (k1 * k1))
                .max(0.0);
        self.mean = (block_mean + k * self.mean) / k1;
        self.blocks += 1;
    }

    /// Fold one block of raw values.
    pub fn update(&mut self, values: &[f64]) {
        let (m, v) = block_statistics(values);
        self.update_with_stats(m, v);
    }

    /// Number of blocks folded so far.
    pub fn outer_sampling(&self) -> usize {
        self.blocks
    }

    /// Current mean over all values.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Current population variance over all values.
    pub fn population_variance(&self) -> f64 {
        self.population_variance
    }

    /// Variance of the mean estimator, `S / (k p)`.
    pub fn variance_estimate(&self) -> f64 {
        let n = self.blocks * self.block_size;
        if n == 0 { f64::NAN } else { self.population_variance / n as f64 }
    }

    /// Freeze the current state.
    pub fn snapshot(&self) -> RunningEstimate {
        RunningEstimate {
            mean: if self.blocks == 0 { f64::NAN } else { self.mean },
            variance: self.variance_estimate(),
            outer_sampling: self.blocks,
            block_size: self.block_size,
        }
    }
}

/// Mean and population variance of one block (two-pass).
pub(crate) fn block_statistics(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var)
}

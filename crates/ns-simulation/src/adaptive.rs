//! Building blocks shared by the multi-stage algorithms: empirical quantiles,
//! intermediate thresholds, critical samples and the likelihood-ratio estimator.

use ns_core::{ComparisonOperator, Error, Result, Sample};
use serde::{Deserialize, Serialize};

use crate::quantile_confidence::QuantileConfidence;

// ---------------------------------------------------------------------------
// Empirical quantiles
// ---------------------------------------------------------------------------

/// Quantile of sorted data with linear interpolation between order statistics.
pub fn quantile_linear_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let i = pos.floor() as usize;
            let j = pos.ceil() as usize;
            let t = pos - i as f64;
            if i == j { sorted[i] } else { (1.0 - t) * sorted[i] + t * sorted[j] }
        }
    }
}

/// Empirical `level`-quantile of `values`.
pub fn empirical_quantile(values: &[f64], level: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(Error::Validation("cannot take the quantile of an empty sample".into()));
    }
    if !(0.0..=1.0).contains(&level) {
        return Err(Error::Validation(format!("quantile level must be in [0, 1], got {}", level)));
    }
    if values.iter().any(|v| v.is_nan()) {
        return Err(Error::Computation("model outputs contain NaN".into()));
    }
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    Ok(quantile_linear_sorted(&v, level))
}

/// Quantile level that leaves a fraction `rho` of the outputs on the event side.
pub fn level_for(operator: ComparisonOperator, rho: f64) -> f64 {
    if operator.is_lower_tail() { rho } else { 1.0 - rho }
}

// ---------------------------------------------------------------------------
// Threshold schedule
// ---------------------------------------------------------------------------

/// Inputs (physical space) and outputs of one stage, kept on request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSample {
    /// Stage inputs.
    pub inputs: Sample,
    /// Stage outputs.
    pub outputs: Vec<f64>,
}

/// Intermediate thresholds, one per stage, monotone toward the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSchedule {
    operator: ComparisonOperator,
    target: f64,
    thresholds: Vec<f64>,
}

impl ThresholdSchedule {
    /// Empty schedule toward `target`.
    pub fn new(operator: ComparisonOperator, target: f64) -> Self {
        Self { operator, target, thresholds: Vec::new() }
    }

    fn moves_away(&self, threshold: f64, last: f64) -> bool {
        if self.operator.is_lower_tail() { threshold > last } else { threshold < last }
    }

    /// Append the next threshold, which must not move away from the target.
    ///
    /// Strict form for algorithms whose levels are nested by construction (subset
    /// sampling). Staged importance samplers call [`ThresholdSchedule::advance`].
    pub fn push(&mut self, threshold: f64) -> Result<()> {
        if let Some(last) = self.last() {
            if self.moves_away(threshold, last) {
                return Err(Error::Computation(format!(
                    "intermediate threshold {} moves away from {} (previous {})",
                    threshold, self.target, last
                )));
            }
        }
        self.thresholds.push(threshold);
        Ok(())
    }

    /// Append a stage quantile, clamped so the schedule stays monotone.
    ///
    /// A quantile farther from the target than the previous threshold is sampling
    /// noise on a stagnating run: the previous threshold is repeated instead and the
    /// caller selects its critical sample against the returned level. Returns
    /// `(level, clamped)`.
    pub fn advance(&mut self, threshold: f64) -> (f64, bool) {
        let level = match self.last() {
            Some(last) if self.moves_away(threshold, last) => {
                log::warn!(
                    "stage quantile {:.6e} moves away from {} (previous {:.6e}), level kept",
                    threshold,
                    self.target,
                    last
                );
                last
            }
            _ => threshold,
        };
        self.thresholds.push(level);
        (level, level != threshold)
    }

    /// Thresholds in stage order.
    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    /// Latest threshold.
    pub fn last(&self) -> Option<f64> {
        self.thresholds.last().copied()
    }

    /// `true` once the target itself was appended.
    pub fn reached(&self) -> bool {
        self.last() == Some(self.target)
    }

    /// Number of stages recorded.
    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    /// `true` when no stage was recorded.
    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}

/// Intermediate threshold of a stage: the `level`-quantile of the outputs, or the
/// target once the quantile already lies in the event (or on its boundary).
///
/// Returns `(threshold, target_reached)`.
pub fn intermediate_threshold(
    operator: ComparisonOperator,
    outputs: &[f64],
    rho: f64,
    target: f64,
) -> Result<(f64, bool)> {
    let q = empirical_quantile(outputs, level_for(operator, rho))?;
    if operator.compare(q, target) || q == target {
        Ok((target, true))
    } else {
        Ok((q, false))
    }
}

/// Indices of the outputs in the event `output op threshold`.
///
/// An empty selection is a degenerate stage and raises.
pub fn critical_indices(
    operator: ComparisonOperator,
    outputs: &[f64],
    threshold: f64,
) -> Result<Vec<usize>> {
    let idx: Vec<usize> = outputs
        .iter()
        .enumerate()
        .filter(|(_, y)| operator.compare(**y, threshold))
        .map(|(i, _)| i)
        .collect();
    if idx.is_empty() {
        return Err(Error::Computation(format!(
            "empty critical sample: no output {} {} among {} points",
            operator.symbol(),
            threshold,
            outputs.len()
        )));
    }
    Ok(idx)
}

// ---------------------------------------------------------------------------
// Likelihood-ratio estimator
// ---------------------------------------------------------------------------

/// Probability estimate from the critical points of a weighted sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LikelihoodRatioEstimate {
    /// `p = (1/N) sum_critical w_i`.
    pub probability: f64,
    /// `(sum_critical (w_i - p)^2 + (N - m) p^2) / (N (N - 1))`.
    pub variance: f64,
}

/// Estimate from log likelihood ratios `log p_initial(x_i) - log p_aux(x_i)` of the
/// `m` critical points out of `sample_size` draws.
pub fn likelihood_ratio_estimate(
    log_ratios: &[f64],
    sample_size: usize,
) -> Result<LikelihoodRatioEstimate> {
    if sample_size <= 1 {
        return Err(Error::NotDefined(format!(
            "likelihood-ratio estimator needs more than one draw, got {}",
            sample_size
        )));
    }
    if log_ratios.len() > sample_size {
        return Err(Error::Validation(format!(
            "{} critical points out of {} draws",
            log_ratios.len(),
            sample_size
        )));
    }
    let n = sample_size as f64;
    let w: Vec<f64> = log_ratios.iter().map(|lr| lr.exp()).collect();
    if w.iter().any(|v| !v.is_finite()) {
        return Err(Error::Computation("non-finite likelihood ratio".into()));
    }
    let p = w.iter().sum::<f64>() / n;
    let inside: f64 = w.iter().map(|wi| (wi - p) * (wi - p)).sum();
    let outside = (sample_size - w.len()) as f64 * p * p;
    Ok(LikelihoodRatioEstimate { probability: p, variance: (inside + outside) / (n * (n - 1.0)) })
}

/// Normalised weights `w_i / sum w` from log weights, computed stably.
pub(crate) fn normalised_weights(log_weights: &[f64]) -> Result<Vec<f64>> {
    let max = log_weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Err(Error::Computation("critical weights are all zero or non-finite".into()));
    }
    let w: Vec<f64> = log_weights.iter().map(|lw| (lw - max).exp()).collect();
    let total: f64 = w.iter().sum();
    Ok(w.into_iter().map(|wi| wi / total).collect())
}

/// Per-coordinate weighted mean and variance of `points` under normalised `weights`.
pub(crate) fn weighted_moments(points: &Sample, weights: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let d = points.dimension();
    let mut mean = vec![0.0; d];
    for (row, w) in points.rows().zip(weights) {
        for (m, x) in mean.iter_mut().zip(row) {
            *m += w * x;
        }
    }
    let mut var = vec![0.0; d];
    for (row, w) in points.rows().zip(weights) {
        for ((v, x), m) in var.iter_mut().zip(row).zip(&mean) {
            *v += w * (x - m) * (x - m);
        }
    }
    (mean, var)
}

/// Log a warning when `size` draws cannot bound the stage quantile at 95% confidence.
pub(crate) fn warn_if_undersized(size: usize, rho: f64) {
    let needed = QuantileConfidence::new(1.0 - rho, 0.95)
        .and_then(|qc| qc.unilateral_minimum_sample_size(0, false));
    if let Ok(needed) = needed {
        if size < needed {
            log::warn!(
                "stage sample of {} points is below the {} needed to bound the {}-quantile",
                size,
                needed,
                1.0 - rho
            );
        }
    }
}

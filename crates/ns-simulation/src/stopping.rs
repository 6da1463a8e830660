//! Stopping rules, progress and stop callbacks.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ns_core::{DerivedValue, Error, Result};
use serde::{Deserialize, Serialize};

use crate::estimator::RunningEstimate;

/// Progress callback, called with a completion percentage in `[0, 100]`.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;
/// Stop callback, polled once per outer iteration. Returning `true` stops the run.
pub type StopCallback = Arc<dyn Fn() -> bool + Send + Sync>;

/// Optional user hooks. User state is captured by the closures.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Progress hook.
    pub progress: Option<ProgressCallback>,
    /// Stop hook.
    pub stop: Option<StopCallback>,
}

impl Callbacks {
    pub(crate) fn report(&self, percent: f64) {
        if let Some(cb) = &self.progress {
            cb(percent.clamp(0.0, 100.0));
        }
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(|cb| cb())
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("progress", &self.progress.is_some())
            .field("stop", &self.stop.is_some())
            .finish()
    }
}

/// Why a driver run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Coefficient of variation or standard deviation reached its maximum.
    Converged,
    /// Maximum outer sampling reached.
    MaxOuterSampling,
    /// The stop callback fired.
    UserStopped,
    /// The time budget ran out.
    TimeBudget,
}

/// Stopping thresholds of a driver run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoppingConfig {
    /// Maximum number of blocks (default 1000).
    pub max_outer_sampling: usize,
    /// Stop once `0 < cov <= max` (default 0.1; `0` disables).
    pub max_coefficient_of_variation: f64,
    /// Stop once `0 < sd <= max` (default 0, disabled).
    pub max_standard_deviation: f64,
    /// Wall-clock budget in seconds (default none).
    pub max_duration_secs: Option<f64>,
}

impl Default for StoppingConfig {
    fn default() -> Self {
        Self {
            max_outer_sampling: 1000,
            max_coefficient_of_variation: 0.1,
            max_standard_deviation: 0.0,
            max_duration_secs: None,
        }
    }
}

impl StoppingConfig {
    /// Validate thresholds.
    pub fn validate(&self) -> Result<()> {
        if self.max_outer_sampling == 0 {
            return Err(Error::Validation("max_outer_sampling must be > 0".into()));
        }
        let cov = self.max_coefficient_of_variation;
        if !cov.is_finite() || cov < 0.0 {
            return Err(Error::Validation(format!(
                "max_coefficient_of_variation must be finite and >= 0, got {}",
                self.max_coefficient_of_variation
            )));
        }
        if !self.max_standard_deviation.is_finite() || self.max_standard_deviation < 0.0 {
            return Err(Error::Validation(format!(
                "max_standard_deviation must be finite and >= 0, got {}",
                self.max_standard_deviation
            )));
        }
        validate_duration(self.max_duration_secs)
    }

    pub(crate) fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs_f64)
    }

    /// Evaluate the rules after a block was folded.
    ///
    /// Order: user stop, time budget, accuracy, exhaustion.
    pub(crate) fn check(
        &self,
        estimate: &RunningEstimate,
        started: Instant,
        callbacks: &Callbacks,
    ) -> Option<Termination> {
        if callbacks.stop_requested() {
            return Some(Termination::UserStopped);
        }
        if self.max_duration().is_some_and(|d| started.elapsed() >= d) {
            return Some(Termination::TimeBudget);
        }
        if let DerivedValue::Defined(cov) = estimate.coefficient_of_variation() {
            if self.max_coefficient_of_variation > 0.0
                && cov > 0.0
                && cov <= self.max_coefficient_of_variation
            {
                return Some(Termination::Converged);
            }
        }
        if let DerivedValue::Defined(sd) = estimate.standard_deviation() {
            if self.max_standard_deviation > 0.0 && sd > 0.0 && sd <= self.max_standard_deviation {
                return Some(Termination::Converged);
            }
        }
        if estimate.outer_sampling >= self.max_outer_sampling {
            return Some(Termination::MaxOuterSampling);
        }
        None
    }

    /// Completion percentage: the most advanced of the active criteria.
    pub(crate) fn progress(&self, estimate: &RunningEstimate, started: Instant) -> f64 {
        let mut frac = estimate.outer_sampling as f64 / self.max_outer_sampling as f64;
        if let Some(d) = self.max_duration() {
            if !d.is_zero() {
                frac = frac.max(started.elapsed().as_secs_f64() / d.as_secs_f64());
            }
        }
        if let DerivedValue::Defined(cov) = estimate.coefficient_of_variation() {
            if self.max_coefficient_of_variation > 0.0 && cov > 0.0 {
                frac = frac.max((self.max_coefficient_of_variation / cov).powi(2));
            }
        }
        if let DerivedValue::Defined(sd) = estimate.standard_deviation() {
            if self.max_standard_deviation > 0.0 && sd > 0.0 {
                frac = frac.max((self.max_standard_deviation / sd).powi(2));
            }
        }
        (100.0 * frac).min(100.0)
    }
}

pub(crate) fn validate_duration(secs: Option<f64>) -> Result<()> {
    if let Some(s) = secs {
        if !s.is_finite() || s < 0.0 {
            return Err(Error::Validation(format!(
                "max_duration_secs must be finite and >= 0, got {}",
                s
            )));
        }
    }
    Ok(())
}

/// Between-stage polling for multi-stage algorithms.
///
/// Interrupting staging leaves no valid estimator, so both conditions surface as
/// errors rather than terminations.
#[derive(Debug, Clone)]
pub(crate) struct StageControl {
    started: Instant,
    max_duration: Option<Duration>,
    callbacks: Callbacks,
}

impl StageControl {
    pub(crate) fn new(max_duration_secs: Option<f64>, callbacks: Callbacks) -> Self {
        Self {
            started: Instant::now(),
            max_duration: max_duration_secs.map(Duration::from_secs_f64),
            callbacks,
        }
    }

    pub(crate) fn poll(&self, stage: usize) -> Result<()> {
        if self.callbacks.stop_requested() {
            return Err(Error::UserStopped(format!("stop requested before stage {}", stage)));
        }
        if self.max_duration.is_some_and(|d| self.started.elapsed() >= d) {
            return Err(Error::Timeout(format!(
                "time budget of {:.3}s exhausted before stage {}",
                self.max_duration.map(|d| d.as_secs_f64()).unwrap_or_default(),
                stage
            )));
        }
        Ok(())
    }

    pub(crate) fn report(&self, percent: f64) {
        self.callbacks.report(percent);
    }

    pub(crate) fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

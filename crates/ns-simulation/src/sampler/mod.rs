//! Block samplers: one block of realizations per driver iteration.
//!
//! ## Architecture
//!
//! - [`BlockSampler`] is the seam between the driver and a sampling method.
//! - [`EventSampler`] is the closed set of methods chosen at construction time
//!   (crude with Monte-Carlo/LHS/QMC experiments, importance, directional).
//! - Random draws for a block come from the per-block stream handed in by the
//!   driver; model evaluation inside a block runs in parallel.

use ns_core::{Result, Sample};
use rand::rngs::StdRng;

pub mod crude;
pub mod directional;
pub mod importance;

pub use crude::{CrudeSampler, Experiment};
pub use directional::DirectionalSampler;
pub use importance::ImportanceSampler;

/// One block of realizations.
#[derive(Debug, Clone)]
pub struct Block {
    /// Drawn realizations (unit directions for directional sampling).
    pub inputs: Sample,
    /// Output per realization (model output, or direction-conditional mass).
    pub outputs: Vec<f64>,
    /// Likelihood ratios for weighted samplers.
    pub weights: Option<Vec<f64>>,
    /// Values folded into the running estimator.
    pub contributions: Vec<f64>,
}

impl Block {
    /// Number of realizations.
    pub fn len(&self) -> usize {
        self.contributions.len()
    }

    /// `true` for an empty block.
    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }
}

/// Produces blocks of realizations of an estimator's summand.
pub trait BlockSampler: Send {
    /// Draw and evaluate exactly `size` realizations using `rng`.
    fn compute_block(&mut self, size: usize, rng: &mut StdRng) -> Result<Block>;

    /// Forget run-level state (sequence positions, cached origin values).
    fn reset(&mut self) {}

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

/// The sampling methods of the driver.
#[derive(Debug, Clone)]
pub enum EventSampler {
    /// Crude sampling of the event indicator (or raw output).
    Crude(CrudeSampler),
    /// Importance sampling with a fixed auxiliary density.
    Importance(ImportanceSampler),
    /// Directional sampling in the standard space.
    Directional(DirectionalSampler),
}

impl BlockSampler for EventSampler {
    fn compute_block(&mut self, size: usize, rng: &mut StdRng) -> Result<Block> {
        match self {
            EventSampler::Crude(s) => s.compute_block(size, rng),
            EventSampler::Importance(s) => s.compute_block(size, rng),
            EventSampler::Directional(s) => s.compute_block(size, rng),
        }
    }

    fn reset(&mut self) {
        match self {
            EventSampler::Crude(s) => s.reset(),
            EventSampler::Importance(s) => s.reset(),
            EventSampler::Directional(s) => s.reset(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            EventSampler::Crude(s) => s.name(),
            EventSampler::Importance(s) => s.name(),
            EventSampler::Directional(s) => s.name(),
        }
    }
}

impl From<CrudeSampler> for EventSampler {
    fn from(s: CrudeSampler) -> Self {
        EventSampler::Crude(s)
    }
}

impl From<ImportanceSampler> for EventSampler {
    fn from(s: ImportanceSampler) -> Self {
        EventSampler::Importance(s)
    }
}

impl From<DirectionalSampler> for EventSampler {
    fn from(s: DirectionalSampler) -> Self {
        EventSampler::Directional(s)
    }
}

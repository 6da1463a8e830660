//! Importance sampling with a fixed auxiliary density.

use std::sync::Arc;

use ns_core::{Error, Result};
use ns_prob::Distribution;
use rand::rngs::StdRng;

use super::{Block, BlockSampler};
use crate::event::ThresholdEvent;

/// Draws from an auxiliary density and weights event points by
/// `p_initial(x) / p_auxiliary(x)`; non-event points contribute zero.
///
/// `E_aux[1_event(X) p_initial(X) / p_aux(X)] = P_initial(event)`.
#[derive(Debug, Clone)]
pub struct ImportanceSampler {
    event: ThresholdEvent,
    auxiliary: Arc<dyn Distribution>,
}

impl ImportanceSampler {
    /// Build with an auxiliary density of the event's input dimension.
    pub fn new(event: ThresholdEvent, auxiliary: Arc<dyn Distribution>) -> Result<Self> {
        if auxiliary.dimension() != event.dimension() {
            return Err(Error::Validation(format!(
                "auxiliary dimension {} != event dimension {}",
                auxiliary.dimension(),
                event.dimension()
            )));
        }
        Ok(Self { event, auxiliary })
    }

    /// Auxiliary density.
    pub fn auxiliary(&self) -> &Arc<dyn Distribution> {
        &self.auxiliary
    }
}

impl BlockSampler for ImportanceSampler {
    fn compute_block(&mut self, size: usize, rng: &mut StdRng) -> Result<Block> {
        let inputs = self.auxiliary.sample(rng, size);
        let outputs = self.event.evaluate(&inputs)?;
        let initial = self.event.distribution();
        let mut weights = vec![0.0; size];
        let mut contributions = vec![0.0; size];
        for (i, x) in inputs.rows().enumerate() {
            if self.event.occurs(outputs[i]) {
                let w = (initial.log_pdf(x) - self.auxiliary.log_pdf(x)).exp();
                weights[i] = w;
                contributions[i] = w;
            }
        }
        Ok(Block { inputs, outputs, weights: Some(weights), contributions })
    }

    fn name(&self) -> &'static str {
        "importance-sampling"
    }
}

//! Append-only store of estimator snapshots.

use serde::{Deserialize, Serialize};

use crate::estimator::RunningEstimate;

/// Ordered snapshots, one per driver iteration (or per adaptive stage).
///
/// Stays readable after a failed run for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceHistory {
    snapshots: Vec<RunningEstimate>,
}

impl ConvergenceHistory {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot.
    pub fn push(&mut self, snapshot: RunningEstimate) {
        self.snapshots.push(snapshot);
    }

    /// All snapshots in order.
    pub fn snapshots(&self) -> &[RunningEstimate] {
        &self.snapshots
    }

    /// Most recent snapshot.
    pub fn last(&self) -> Option<&RunningEstimate> {
        self.snapshots.last()
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// `true` when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// `(outer_sampling, mean)` pairs for plotting.
    pub fn means(&self) -> Vec<(usize, f64)> {
        self.snapshots.iter().map(|s| (s.outer_sampling, s.mean)).collect()
    }
}

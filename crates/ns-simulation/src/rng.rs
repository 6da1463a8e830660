//! Counter-based random streams.
//!
//! Every block (or stage) of a run draws from its own `StdRng` derived from
//! `(seed, counter)`. Draws for a block are taken serially from that stream before
//! any parallel evaluation, so a fixed seed gives bit-exact results whatever the
//! thread count.

use rand::SeedableRng;
use rand::rngs::StdRng;

/// Counter-based stream. Same `(seed, counter)` gives the same draw sequence.
///
/// Uses a multiplicative hash-mix to decorrelate nearby `(seed, counter)` pairs.
#[inline]
pub fn block_rng(seed: u64, counter: u64) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_mul(2654435761).wrapping_add(counter))
}

/// Stream for sub-step `step` of stage `stage` (e.g. one Markov-chain step).
#[inline]
pub(crate) fn stage_rng(seed: u64, stage: u64, step: u64) -> StdRng {
    block_rng(seed.wrapping_add(stage.wrapping_mul(1_000_000_007)), step)
}

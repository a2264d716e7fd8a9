//! Basic-block similarity.

use serde::{Deserialize, Serialize};

use crate::config::BlockWeights;
use crate::heuristics::sequence::sequence_ratio;
use crate::model::Block;

/// Per-channel sequence ratios of one block pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockChannels {
    pub itypes: f64,
    pub strings: f64,
    pub calls: f64,
    pub immediates: f64,
}

impl BlockChannels {
    pub fn compute(a: &Block<'_>, b: &Block<'_>) -> Self {
        Self {
            itypes: sequence_ratio(a.itypes, b.itypes),
            strings: sequence_ratio(&a.strings, &b.strings),
            calls: sequence_ratio(&a.calls, &b.calls),
            immediates: sequence_ratio(&a.immediates, &b.immediates),
        }
    }

    pub fn weighted(&self, weights: &BlockWeights) -> f64 {
        weights.itypes * self.itypes
            + weights.strings * self.strings
            + weights.calls * self.calls
            + weights.immediates * self.immediates
    }
}

/// Grade two blocks in `[0, 1]`. Identical blocks short-circuit to `1.0`.
pub fn block_ratio(a: &Block<'_>, b: &Block<'_>, weights: &BlockWeights) -> f64 {
    if a == b {
        return 1.0;
    }
    BlockChannels::compute(a, b).weighted(weights)
}

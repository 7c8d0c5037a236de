use serde::{Deserialize, Serialize};

/// Total and self weight accumulated by a frame or call tree node.
///
/// Accumulation is unchecked: deltas may be negative when the input is
/// corrupt, and callers are responsible for not counting the same elapsed
/// time twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    /// Time spent in this node and everything it called.
    pub total: f64,
    /// Time spent in this node only.
    pub self_weight: f64,
}

impl Weight {
    /// Add `delta` to the total weight and return the new total.
    pub fn add_to_total(&mut self, delta: f64) -> f64 {
        self.total += delta;
        self.total
    }

    /// Add `delta` to the self weight and return the new self weight.
    pub fn add_to_self(&mut self, delta: f64) -> f64 {
        self.self_weight += delta;
        self.self_weight
    }
}

//! Pattern: a repeated tool sequence mined from history.

use serde::{Deserialize, Serialize};

/// Derived value; never mutated, only regenerated by re-running the miner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Tool identifiers in order
    pub sequence: Vec<String>,

    /// Occurrences observed in the mined window (overlapping)
    pub count: u32,

    /// `count / windows of this length`, in [0, 1]
    pub confidence: f64,
}

impl Pattern {
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Human-readable label, e.g. `click → type → submit`.
    pub fn label(&self) -> String {
        self.sequence.join(" → ")
    }
}
